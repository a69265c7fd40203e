//! External collaborators.
//!
//! Each collaborator is a trait object so the room actors can be driven by
//! mocks in tests. The HTTP implementations share one timeout taken from
//! configuration and map every transport or status failure to the
//! collaborator's `RoomError` variant.

pub mod credentials;
pub mod messaging;
pub mod whiteboard;

pub use credentials::{CredentialIssuer, JwtCredentialIssuer};
pub use messaging::{HttpMessagingClient, MessagingClient};
pub use whiteboard::{HttpWhiteboardClient, WhiteboardClient};

use crate::errors::RoomError;
use reqwest::Client;
use std::time::Duration;
use tracing::error;

/// Connect timeout applied on top of the per-request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the shared HTTP client for collaborator calls.
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, RoomError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .map_err(|e| {
            error!(target: "classroom.services", error = %e, "Failed to build HTTP client");
            RoomError::Internal(format!("http client: {e}"))
        })
}

/// Trim a trailing slash so paths can be appended with `format!`.
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
