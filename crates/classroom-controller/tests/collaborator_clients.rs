//! Integration tests for the HTTP collaborator clients and the credential
//! issuer, against a wiremock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use classroom_controller::errors::RoomError;
use classroom_controller::notifications::{Envelope, Notification};
use classroom_controller::services::{
    CredentialIssuer, HttpMessagingClient, HttpWhiteboardClient, JwtCredentialIssuer,
    MessagingClient, WhiteboardClient,
};
use common::secret::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-api-key";
const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef";

// ============================================================================
// Test Helpers
// ============================================================================

fn messaging_client(server: &MockServer) -> HttpMessagingClient {
    HttpMessagingClient::new(
        &server.uri(),
        SecretString::from(API_KEY),
        Duration::from_millis(500),
    )
    .unwrap()
}

fn whiteboard_client(server: &MockServer) -> HttpWhiteboardClient {
    HttpWhiteboardClient::new(&format!("{}/", server.uri()), Duration::from_millis(500)).unwrap()
}

// ============================================================================
// Messaging
// ============================================================================

#[tokio::test]
async fn test_group_calls_post_to_action_paths() {
    let server = MockServer::start().await;
    for action in ["create", "join", "quit", "dismiss"] {
        Mock::given(method("POST"))
            .and(path(format!("/groups/{action}")))
            .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
            .and(body_json(json!({ "group_id": "room-1", "user_id": "u-1" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = messaging_client(&server);
    client.create_group("room-1", "u-1").await.unwrap();
    client.join_group("room-1", "u-1").await.unwrap();
    client.quit_group("room-1", "u-1").await.unwrap();
    client.dismiss_group("room-1", "u-1").await.unwrap();
}

#[tokio::test]
async fn test_publish_sends_envelope_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages/publish"))
        .and(body_json(json!({
            "room_id": "room-1",
            "sender_id": "system",
            "notification": { "type": "room_dismissed", "reason": "expired" }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = Envelope {
        room_id: "room-1".to_string(),
        sender_id: "system".to_string(),
        target_user_id: None,
        notification: Notification::RoomDismissed {
            reason: "expired".to_string(),
        },
    };
    messaging_client(&server).publish(&envelope).await.unwrap();
}

#[tokio::test]
async fn test_messaging_error_status_maps_to_messaging_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/groups/join"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = messaging_client(&server).join_group("room-1", "u-1").await;
    assert!(matches!(result, Err(RoomError::Messaging(_))));
}

#[tokio::test]
async fn test_messaging_timeout_maps_to_messaging_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/groups/create"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let result = messaging_client(&server).create_group("room-1", "u-1").await;
    assert!(matches!(result, Err(RoomError::Messaging(_))));
}

#[tokio::test]
async fn test_user_token_is_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .and(body_json(json!({ "user_id": "u-1", "name": "alice" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "im-token" })))
        .mount(&server)
        .await;

    let token = messaging_client(&server)
        .issue_user_token("u-1", "alice")
        .await
        .unwrap();
    assert_eq!(token, "im-token");
}

// ============================================================================
// Whiteboard
// ============================================================================

#[tokio::test]
async fn test_whiteboard_create_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/whiteboards"))
        .and(body_json(json!({ "token": "room-token" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "wb-42" })))
        .mount(&server)
        .await;

    let id = whiteboard_client(&server).create("room-token").await.unwrap();
    assert_eq!(id, "wb-42");
}

#[tokio::test]
async fn test_whiteboard_create_rejects_empty_id_and_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/whiteboards"))
        .and(body_json(json!({ "token": "empty" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/whiteboards"))
        .and(body_json(json!({ "token": "broken" })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = whiteboard_client(&server);
    assert!(matches!(
        client.create("empty").await,
        Err(RoomError::Whiteboard(_))
    ));
    assert!(matches!(
        client.create("broken").await,
        Err(RoomError::Whiteboard(_))
    ));
}

#[tokio::test]
async fn test_whiteboard_destroy_treats_missing_as_done() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/whiteboards/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/whiteboards/live"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/whiteboards/stuck"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = whiteboard_client(&server);
    client.destroy("gone").await.unwrap();
    client.destroy("live").await.unwrap();
    assert!(matches!(
        client.destroy("stuck").await,
        Err(RoomError::Whiteboard(_))
    ));
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_session_token_round_trips_through_verify() {
    let server = MockServer::start().await;
    let messaging: Arc<dyn MessagingClient> = Arc::new(messaging_client(&server));
    let issuer = JwtCredentialIssuer::new(
        SecretString::from(SESSION_SECRET),
        Duration::from_secs(3600),
        messaging,
    );

    let token = issuer
        .issue_session_token("u-1", "alice", "room-1")
        .await
        .unwrap();
    let claims = issuer.verify_session_token(&token).unwrap();
    assert_eq!(claims.sub, "u-1");
    assert_eq!(claims.name, "alice");
    assert_eq!(claims.room, "room-1");

    let other = JwtCredentialIssuer::new(
        SecretString::from("another-secret-another-secret-00"),
        Duration::from_secs(3600),
        Arc::new(messaging_client(&server)),
    );
    assert!(matches!(
        other.verify_session_token(&token),
        Err(RoomError::Validation(_))
    ));
}

#[tokio::test]
async fn test_messaging_token_failure_maps_to_credentials_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users/token"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let issuer = JwtCredentialIssuer::new(
        SecretString::from(SESSION_SECRET),
        Duration::from_secs(3600),
        Arc::new(messaging_client(&server)),
    );
    assert!(matches!(
        issuer.issue_messaging_token("u-1", "alice").await,
        Err(RoomError::Credentials(_))
    ));
}
