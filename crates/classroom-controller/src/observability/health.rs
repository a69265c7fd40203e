//! Probe endpoints.
//!
//! - `GET /health`: liveness, 200 while the process runs
//! - `GET /ready`: 200 only while the controller is serving rooms
//!
//! Both reply with the current phase as a plain-text body so an operator can
//! tell a starting instance from a draining one.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle phase of the controller process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Collaborator clients and actors are still being built.
    Starting = 0,
    Serving = 1,
    /// Shutdown began; rooms are being torn down.
    Draining = 2,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::Serving => "serving",
            Phase::Draining => "draining",
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Phase::Serving,
            2 => Phase::Draining,
            _ => Phase::Starting,
        }
    }
}

/// Phase shared between `main` and the probe handlers.
#[derive(Debug)]
pub struct HealthState {
    phase: AtomicU8,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Starting as u8),
        }
    }

    pub fn mark_serving(&self) {
        // Draining is terminal
        let _ = self.phase.compare_exchange(
            Phase::Starting as u8,
            Phase::Serving as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub fn mark_draining(&self) {
        self.phase.store(Phase::Draining as u8, Ordering::SeqCst);
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.phase() == Phase::Serving
    }
}

/// Router serving `/health` and `/ready`.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn liveness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    (StatusCode::OK, state.phase().as_str())
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    let phase = state.phase();
    let status = if phase == Phase::Serving {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, phase.as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;

    async fn probe(state: &Arc<HealthState>, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = health_router(Arc::clone(state))
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_draining_is_terminal() {
        let state = HealthState::new();
        assert_eq!(state.phase(), Phase::Starting);

        state.mark_serving();
        assert!(state.is_ready());

        state.mark_draining();
        state.mark_serving();
        assert_eq!(state.phase(), Phase::Draining);
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_liveness_reports_phase() {
        let state = Arc::new(HealthState::new());
        assert_eq!(
            probe(&state, "/health").await,
            (StatusCode::OK, "starting".to_string())
        );
    }

    #[tokio::test]
    async fn test_readiness_follows_phase() {
        let state = Arc::new(HealthState::new());
        assert_eq!(
            probe(&state, "/ready").await,
            (StatusCode::SERVICE_UNAVAILABLE, "starting".to_string())
        );

        state.mark_serving();
        assert_eq!(
            probe(&state, "/ready").await,
            (StatusCode::OK, "serving".to_string())
        );

        state.mark_draining();
        assert_eq!(
            probe(&state, "/ready").await,
            (StatusCode::SERVICE_UNAVAILABLE, "draining".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404() {
        let state = Arc::new(HealthState::new());
        assert_eq!(probe(&state, "/rooms").await.0, StatusCode::NOT_FOUND);
    }
}
