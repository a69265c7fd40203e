//! Mock credential issuer with deterministic tokens.

use async_trait::async_trait;
use classroom_controller::errors::RoomError;
use classroom_controller::services::CredentialIssuer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Issues `session:<user>:<room>` and `messaging:<user>` tokens.
#[derive(Debug, Clone, Default)]
pub struct MockCredentials {
    failing: Arc<AtomicBool>,
    issued: Arc<AtomicUsize>,
}

impl MockCredentials {
    pub fn accepting() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of tokens issued so far.
    pub fn issued_count(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), RoomError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RoomError::Credentials("mock credential failure".to_string()));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl CredentialIssuer for MockCredentials {
    async fn issue_session_token(
        &self,
        user_id: &str,
        _user_name: &str,
        room_id: &str,
    ) -> Result<String, RoomError> {
        self.check()?;
        Ok(format!("session:{user_id}:{room_id}"))
    }

    async fn issue_messaging_token(
        &self,
        user_id: &str,
        _user_name: &str,
    ) -> Result<String, RoomError> {
        self.check()?;
        Ok(format!("messaging:{user_id}"))
    }
}
