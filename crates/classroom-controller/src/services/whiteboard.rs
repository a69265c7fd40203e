//! Whiteboard collaborator: opens and closes whiteboard sessions.

use super::{build_http_client, normalize_base_url};
use crate::errors::RoomError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

/// Whiteboard session service.
#[async_trait]
pub trait WhiteboardClient: Send + Sync {
    /// Open a session under `room_token` and return its external id.
    async fn create(&self, room_token: &str) -> Result<String, RoomError>;

    /// Close the session opened under `room_token`.
    async fn destroy(&self, room_token: &str) -> Result<(), RoomError>;
}

#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

/// [`WhiteboardClient`] over the whiteboard service's HTTP API.
#[derive(Clone)]
pub struct HttpWhiteboardClient {
    client: Client,
    base_url: String,
}

impl HttpWhiteboardClient {
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RoomError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: normalize_base_url(base_url),
        })
    }
}

fn transport_error(action: &str, e: &reqwest::Error) -> RoomError {
    warn!(
        target: "classroom.services.whiteboard",
        action = action,
        error = %e,
        "Whiteboard request failed"
    );
    RoomError::Whiteboard(format!("{action}: {e}"))
}

#[async_trait]
impl WhiteboardClient for HttpWhiteboardClient {
    #[instrument(skip_all)]
    async fn create(&self, room_token: &str) -> Result<String, RoomError> {
        let url = format!("{}/whiteboards", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&CreateRequest { token: room_token })
            .send()
            .await
            .map_err(|e| transport_error("create", &e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                target: "classroom.services.whiteboard",
                status = %status,
                "Whiteboard create rejected"
            );
            return Err(RoomError::Whiteboard(format!("create returned {status}")));
        }

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| RoomError::Whiteboard(format!("create response: {e}")))?;
        if created.id.is_empty() {
            return Err(RoomError::Whiteboard("create returned an empty id".to_string()));
        }
        Ok(created.id)
    }

    #[instrument(skip_all)]
    async fn destroy(&self, room_token: &str) -> Result<(), RoomError> {
        let url = format!("{}/whiteboards/{room_token}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| transport_error("destroy", &e))?;

        let status = response.status();
        // Already gone counts as destroyed.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            warn!(
                target: "classroom.services.whiteboard",
                status = %status,
                "Whiteboard destroy rejected"
            );
            Err(RoomError::Whiteboard(format!("destroy returned {status}")))
        }
    }
}
