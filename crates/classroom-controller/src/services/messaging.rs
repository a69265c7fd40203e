//! Messaging collaborator: group membership and event delivery.

use super::{build_http_client, normalize_base_url};
use crate::errors::RoomError;
use crate::notifications::Envelope;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

/// Pub/sub transport used to reach room members.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Create the room's group with `user_id` as its first member.
    async fn create_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError>;

    async fn join_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError>;

    async fn quit_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError>;

    /// Dissolve the room's group. `user_id` is the member whose action caused it.
    async fn dismiss_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError>;

    /// Deliver one event to the room, or to one member of it.
    async fn publish(&self, envelope: &Envelope) -> Result<(), RoomError>;

    /// Mint the per-user token a client uses to connect to the transport.
    async fn issue_user_token(&self, user_id: &str, user_name: &str) -> Result<String, RoomError>;
}

#[derive(Debug, Serialize)]
struct GroupRequest<'a> {
    group_id: &'a str,
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct UserTokenRequest<'a> {
    user_id: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UserTokenResponse {
    token: String,
}

/// [`MessagingClient`] over the messaging service's HTTP API.
#[derive(Clone)]
pub struct HttpMessagingClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpMessagingClient {
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, RoomError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: normalize_base_url(base_url),
            api_key,
        })
    }

    async fn post<B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, RoomError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(
                    target: "classroom.services.messaging",
                    path = path,
                    error = %e,
                    "Messaging request failed"
                );
                RoomError::Messaging(format!("{path}: {e}"))
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(
                target: "classroom.services.messaging",
                path = path,
                status = %status,
                body = %body,
                "Messaging service rejected request"
            );
            Err(RoomError::Messaging(format!("{path} returned {status}")))
        }
    }

    async fn group_call(
        &self,
        action: &str,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), RoomError> {
        let path = format!("/groups/{action}");
        self.post(&path, &GroupRequest { group_id: room_id, user_id }).await
            .map(|_| ())
    }
}

#[async_trait]
impl MessagingClient for HttpMessagingClient {
    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn create_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call("create", room_id, user_id).await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn join_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call("join", room_id, user_id).await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn quit_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call("quit", room_id, user_id).await
    }

    #[instrument(skip_all, fields(room_id = %room_id))]
    async fn dismiss_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call("dismiss", room_id, user_id).await
    }

    #[instrument(
        skip_all,
        fields(room_id = %envelope.room_id, event = envelope.notification.name())
    )]
    async fn publish(&self, envelope: &Envelope) -> Result<(), RoomError> {
        self.post("/messages/publish", envelope).await.map(|_| ())
    }

    #[instrument(skip_all)]
    async fn issue_user_token(&self, user_id: &str, user_name: &str) -> Result<String, RoomError> {
        let response = self
            .post(
                "/users/token",
                &UserTokenRequest {
                    user_id,
                    name: user_name,
                },
            )
            .await?;
        let parsed: UserTokenResponse = response
            .json()
            .await
            .map_err(|e| RoomError::Messaging(format!("token response: {e}")))?;
        Ok(parsed.token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_group_request_shape() {
        let json = serde_json::to_value(GroupRequest {
            group_id: "room-1",
            user_id: "u-1",
        })
        .unwrap();
        assert_eq!(json["group_id"], "room-1");
        assert_eq!(json["user_id"], "u-1");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpMessagingClient::new(
            "http://messaging.local/",
            SecretString::from("k"),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(client.base_url, "http://messaging.local");
    }
}
