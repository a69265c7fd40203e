//! Recording mock of the messaging collaborator.
//!
//! Every group call and every published envelope is kept in order so tests
//! can assert on what a room actor emitted. Individual calls can be made to
//! fail to exercise required-delivery and rollback paths.
//!
//! # Example
//!
//! ```rust,ignore
//! use classroom_test_utils::{GroupOp, MockMessaging};
//!
//! let messaging = MockMessaging::accepting().failing_group_op(GroupOp::Join);
//!
//! // ... drive the controller ...
//!
//! assert_eq!(messaging.group_calls_for(GroupOp::Create).len(), 1);
//! assert!(messaging.events_named("role_changed").is_empty());
//! ```

use async_trait::async_trait;
use classroom_controller::errors::RoomError;
use classroom_controller::notifications::Envelope;
use classroom_controller::services::MessagingClient;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Group operation kinds recorded by [`MockMessaging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupOp {
    Create,
    Join,
    Quit,
    Dismiss,
}

/// One recorded group call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCall {
    pub op: GroupOp,
    pub room_id: String,
    pub user_id: String,
}

/// Mock messaging collaborator.
#[derive(Debug, Clone, Default)]
pub struct MockMessaging {
    inner: Arc<Mutex<MockMessagingInner>>,
}

#[derive(Debug, Default)]
struct MockMessagingInner {
    group_calls: Vec<GroupCall>,
    published: Vec<Envelope>,
    failing_group_ops: HashSet<GroupOp>,
    failing_events: HashSet<&'static str>,
    fail_all_publishes: bool,
    fail_tokens: bool,
}

impl MockMessaging {
    /// A mock that accepts every call.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Fail every call of `op`.
    pub fn failing_group_op(self, op: GroupOp) -> Self {
        self.set_group_op_failing(op, true);
        self
    }

    /// Fail every publish.
    pub fn failing_publish(self) -> Self {
        self.set_publish_failing(true);
        self
    }

    /// Toggle failure for a group operation on an existing mock.
    pub fn set_group_op_failing(&self, op: GroupOp, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        if failing {
            inner.failing_group_ops.insert(op);
        } else {
            inner.failing_group_ops.remove(&op);
        }
    }

    /// Toggle failure for every publish on an existing mock.
    pub fn set_publish_failing(&self, failing: bool) {
        self.inner.lock().unwrap().fail_all_publishes = failing;
    }

    /// Fail publishes of one notification, by its event name.
    pub fn fail_event(&self, name: &'static str) {
        self.inner.lock().unwrap().failing_events.insert(name);
    }

    /// Toggle failure for messaging token requests.
    pub fn set_tokens_failing(&self, failing: bool) {
        self.inner.lock().unwrap().fail_tokens = failing;
    }

    /// Clear every configured failure.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing_group_ops.clear();
        inner.failing_events.clear();
        inner.fail_all_publishes = false;
        inner.fail_tokens = false;
    }

    /// Forget recorded calls and envelopes.
    pub fn clear_recorded(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.group_calls.clear();
        inner.published.clear();
    }

    /// Every successfully published envelope, in order.
    pub fn published(&self) -> Vec<Envelope> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Published envelopes whose notification has event name `name`.
    pub fn events_named(&self, name: &str) -> Vec<Envelope> {
        self.published()
            .into_iter()
            .filter(|e| e.notification.name() == name)
            .collect()
    }

    /// JSON payloads of the envelopes named `name`.
    pub fn payloads_named(&self, name: &str) -> Vec<serde_json::Value> {
        self.events_named(name)
            .iter()
            .map(|e| serde_json::to_value(e).unwrap())
            .collect()
    }

    /// Event names of every published envelope, in order.
    pub fn event_names(&self) -> Vec<&'static str> {
        self.inner
            .lock()
            .unwrap()
            .published
            .iter()
            .map(|e| e.notification.name())
            .collect()
    }

    /// Every successful group call, in order.
    pub fn group_calls(&self) -> Vec<GroupCall> {
        self.inner.lock().unwrap().group_calls.clone()
    }

    pub fn group_calls_for(&self, op: GroupOp) -> Vec<GroupCall> {
        self.group_calls()
            .into_iter()
            .filter(|c| c.op == op)
            .collect()
    }

    fn group_call(&self, op: GroupOp, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_group_ops.contains(&op) {
            return Err(RoomError::Messaging(format!("mock {op:?} failure")));
        }
        inner.group_calls.push(GroupCall {
            op,
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for MockMessaging {
    async fn create_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call(GroupOp::Create, room_id, user_id)
    }

    async fn join_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call(GroupOp::Join, room_id, user_id)
    }

    async fn quit_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call(GroupOp::Quit, room_id, user_id)
    }

    async fn dismiss_group(&self, room_id: &str, user_id: &str) -> Result<(), RoomError> {
        self.group_call(GroupOp::Dismiss, room_id, user_id)
    }

    async fn publish(&self, envelope: &Envelope) -> Result<(), RoomError> {
        let mut inner = self.inner.lock().unwrap();
        let name = envelope.notification.name();
        if inner.fail_all_publishes || inner.failing_events.contains(name) {
            return Err(RoomError::Messaging(format!("mock publish failure: {name}")));
        }
        inner.published.push(envelope.clone());
        Ok(())
    }

    async fn issue_user_token(&self, user_id: &str, _user_name: &str) -> Result<String, RoomError> {
        if self.inner.lock().unwrap().fail_tokens {
            return Err(RoomError::Messaging("mock token failure".to_string()));
        }
        Ok(format!("msg-token-{user_id}"))
    }
}
