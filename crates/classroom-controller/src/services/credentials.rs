//! Credential issuer: session tokens and messaging tokens.

use super::MessagingClient;
use crate::errors::RoomError;
use async_trait::async_trait;
use common::jwt::{decode_session_token, encode_session_token, SessionClaims};
use common::secret::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Mints the credentials handed back from a join.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Signed session token bound to `{user_id, user_name, room_id}`.
    async fn issue_session_token(
        &self,
        user_id: &str,
        user_name: &str,
        room_id: &str,
    ) -> Result<String, RoomError>;

    /// Token for connecting to the messaging transport.
    async fn issue_messaging_token(&self, user_id: &str, user_name: &str)
        -> Result<String, RoomError>;
}

/// Signs HS256 session tokens locally and asks the messaging collaborator
/// for messaging tokens.
pub struct JwtCredentialIssuer {
    secret: SecretString,
    ttl: Duration,
    messaging: Arc<dyn MessagingClient>,
}

impl JwtCredentialIssuer {
    #[must_use]
    pub fn new(secret: SecretString, ttl: Duration, messaging: Arc<dyn MessagingClient>) -> Self {
        Self {
            secret,
            ttl,
            messaging,
        }
    }

    /// Verify a session token presented by a client.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for any invalid, expired or oversized token.
    pub fn verify_session_token(&self, token: &str) -> Result<SessionClaims, RoomError> {
        let now = chrono::Utc::now().timestamp();
        decode_session_token(token, self.secret.expose_secret().as_bytes(), now).map_err(|e| {
            debug!(target: "classroom.services.credentials", error = ?e, "Session token rejected");
            RoomError::Validation("invalid session token".to_string())
        })
    }
}

#[async_trait]
impl CredentialIssuer for JwtCredentialIssuer {
    async fn issue_session_token(
        &self,
        user_id: &str,
        user_name: &str,
        room_id: &str,
    ) -> Result<String, RoomError> {
        let now = chrono::Utc::now().timestamp();
        let claims = SessionClaims::new(user_id, user_name, room_id, now, self.ttl);
        encode_session_token(&claims, self.secret.expose_secret().as_bytes()).map_err(|e| {
            error!(
                target: "classroom.services.credentials",
                error = %e,
                "Failed to sign session token"
            );
            RoomError::Credentials(e.to_string())
        })
    }

    async fn issue_messaging_token(
        &self,
        user_id: &str,
        user_name: &str,
    ) -> Result<String, RoomError> {
        self.messaging
            .issue_user_token(user_id, user_name)
            .await
            .map_err(|e| RoomError::Credentials(format!("messaging token: {e}")))
    }
}
