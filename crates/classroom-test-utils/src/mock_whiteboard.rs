//! Mock whiteboard collaborator.

use async_trait::async_trait;
use classroom_controller::errors::RoomError;
use classroom_controller::services::WhiteboardClient;
use std::sync::{Arc, Mutex};

/// Mock whiteboard service. Created whiteboards get ids `wb-1`, `wb-2`, ...
#[derive(Debug, Clone, Default)]
pub struct MockWhiteboard {
    inner: Arc<Mutex<MockWhiteboardInner>>,
}

#[derive(Debug, Default)]
struct MockWhiteboardInner {
    next_id: usize,
    /// `(whiteboard_id, room_token)` for every create.
    created: Vec<(String, String)>,
    /// Room tokens passed to destroy.
    destroyed: Vec<String>,
    fail_create: bool,
    fail_destroy: bool,
}

impl MockWhiteboard {
    /// A mock that accepts every call.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// A mock whose create and destroy both fail.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_create_failing(true);
        mock.set_destroy_failing(true);
        mock
    }

    pub fn set_create_failing(&self, failing: bool) {
        self.inner.lock().unwrap().fail_create = failing;
    }

    pub fn set_destroy_failing(&self, failing: bool) {
        self.inner.lock().unwrap().fail_destroy = failing;
    }

    /// Ids of every whiteboard created, in order.
    pub fn created_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .created
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Room tokens of every destroyed whiteboard, in order.
    pub fn destroyed(&self) -> Vec<String> {
        self.inner.lock().unwrap().destroyed.clone()
    }

    /// Room token that was used to create `whiteboard_id`.
    pub fn token_of(&self, whiteboard_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .created
            .iter()
            .find(|(id, _)| id == whiteboard_id)
            .map(|(_, token)| token.clone())
    }

    /// Whether the whiteboard created as `whiteboard_id` has been destroyed.
    pub fn is_destroyed(&self, whiteboard_id: &str) -> bool {
        self.token_of(whiteboard_id)
            .is_some_and(|token| self.destroyed().contains(&token))
    }
}

#[async_trait]
impl WhiteboardClient for MockWhiteboard {
    async fn create(&self, room_token: &str) -> Result<String, RoomError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_create {
            return Err(RoomError::Whiteboard("mock create failure".to_string()));
        }
        inner.next_id += 1;
        let id = format!("wb-{}", inner.next_id);
        inner.created.push((id.clone(), room_token.to_string()));
        Ok(id)
    }

    async fn destroy(&self, room_token: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_destroy {
            return Err(RoomError::Whiteboard("mock destroy failure".to_string()));
        }
        inner.destroyed.push(room_token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_destroy_are_tracked() {
        let mock = MockWhiteboard::accepting();
        let first = mock.create("token-a").await.unwrap();
        let second = mock.create("token-b").await.unwrap();
        assert_eq!(first, "wb-1");
        assert_eq!(second, "wb-2");

        mock.destroy("token-a").await.unwrap();
        assert!(mock.is_destroyed("wb-1"));
        assert!(!mock.is_destroyed("wb-2"));
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let mock = MockWhiteboard::failing();
        assert!(mock.create("token").await.is_err());
        assert!(mock.destroy("token").await.is_err());
        assert!(mock.created_ids().is_empty());
    }
}
