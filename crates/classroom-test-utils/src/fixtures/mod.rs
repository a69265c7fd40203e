//! Test fixtures: a running controller wired to recording mocks.
//!
//! # Example
//!
//! ```rust,ignore
//! let classroom = TestClassroom::builder()
//!     .capacity(3)
//!     .ticket_ttl(Duration::from_secs(5))
//!     .build();
//!
//! let assistant = classroom.join("room-1", "alice").await.unwrap();
//! let student = classroom.join("room-1", "bob").await.unwrap();
//! ```

use classroom_controller::actors::{
    ActorMetrics, Identity, JoinRequest, JoinResult, RoomControllerHandle, RoomPolicy,
    RoomServices,
};
use classroom_controller::display::{self, DisplayPointer};
use classroom_controller::errors::RoomError;
use classroom_controller::roles::Role;
use classroom_controller::store::{InMemoryRoomStore, MemberRecord, RoomStore};
use classroom_controller::tickets::TicketStore;
use std::sync::Arc;
use std::time::Duration;

use crate::{MockCredentials, MockMessaging, MockWhiteboard};

/// Default seat capacity for test rooms.
pub const TEST_CAPACITY: usize = 4;

/// Default ticket TTL for test rooms.
pub const TEST_TICKET_TTL: Duration = Duration::from_secs(30);

/// Builder for [`TestClassroom`].
#[derive(Debug, Clone)]
pub struct TestClassroomBuilder {
    capacity: usize,
    ticket_ttl: Duration,
    max_lifetime: Option<Duration>,
    messaging: MockMessaging,
    whiteboards: MockWhiteboard,
    credentials: MockCredentials,
}

impl Default for TestClassroomBuilder {
    fn default() -> Self {
        Self {
            capacity: TEST_CAPACITY,
            ticket_ttl: TEST_TICKET_TTL,
            max_lifetime: None,
            messaging: MockMessaging::accepting(),
            whiteboards: MockWhiteboard::accepting(),
            credentials: MockCredentials::accepting(),
        }
    }
}

impl TestClassroomBuilder {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn ticket_ttl(mut self, ttl: Duration) -> Self {
        self.ticket_ttl = ttl;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn messaging(mut self, messaging: MockMessaging) -> Self {
        self.messaging = messaging;
        self
    }

    pub fn whiteboards(mut self, whiteboards: MockWhiteboard) -> Self {
        self.whiteboards = whiteboards;
        self
    }

    pub fn credentials(mut self, credentials: MockCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Spawn the controller. Must be called inside a Tokio runtime.
    pub fn build(self) -> TestClassroom {
        let store = Arc::new(InMemoryRoomStore::new());
        let tickets = Arc::new(TicketStore::new(self.ticket_ttl));
        let metrics = ActorMetrics::new();

        let services = RoomServices::new(
            Arc::clone(&store) as Arc<dyn RoomStore>,
            Arc::new(self.messaging.clone()),
            Arc::new(self.whiteboards.clone()),
            Arc::new(self.credentials.clone()),
            Arc::clone(&tickets),
            RoomPolicy {
                capacity: self.capacity,
                max_lifetime: self.max_lifetime,
            },
        );
        let controller =
            RoomControllerHandle::new("classroom-test".to_string(), services, Arc::clone(&metrics));

        TestClassroom {
            controller,
            messaging: self.messaging,
            whiteboards: self.whiteboards,
            credentials: self.credentials,
            store,
            tickets,
            metrics,
        }
    }
}

/// A running controller plus handles to every collaborator behind it.
pub struct TestClassroom {
    pub controller: RoomControllerHandle,
    pub messaging: MockMessaging,
    pub whiteboards: MockWhiteboard,
    pub credentials: MockCredentials,
    pub store: Arc<InMemoryRoomStore>,
    pub tickets: Arc<TicketStore>,
    pub metrics: Arc<ActorMetrics>,
}

impl TestClassroom {
    pub fn builder() -> TestClassroomBuilder {
        TestClassroomBuilder::default()
    }

    /// Controller with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Join as a fresh, non-audience user.
    pub async fn join(&self, room_id: &str, user_name: &str) -> Result<JoinResult, RoomError> {
        self.controller.join(join_request(room_id, user_name, false)).await
    }

    /// Join as a fresh audience member.
    pub async fn join_audience(
        &self,
        room_id: &str,
        user_name: &str,
    ) -> Result<JoinResult, RoomError> {
        self.controller.join(join_request(room_id, user_name, true)).await
    }

    /// Join reusing an identity from an earlier join.
    pub async fn rejoin(&self, identity: &Identity) -> Result<JoinResult, RoomError> {
        let mut request = join_request(&identity.room_id, &identity.user_name, false);
        request.existing = Some(identity.clone());
        self.controller.join(request).await
    }

    pub async fn leave(&self, room_id: &str, joined: &JoinResult) -> Result<(), RoomError> {
        self.controller.leave(joined.identity(room_id), room_id).await
    }

    /// Members as stored, bypassing the room actor.
    pub async fn members(&self, room_id: &str) -> Vec<MemberRecord> {
        self.store.list_members(room_id).await.unwrap()
    }

    pub async fn role_of(&self, room_id: &str, user_id: &str) -> Option<Role> {
        self.store
            .get_member(room_id, user_id)
            .await
            .unwrap()
            .map(|m| m.role)
    }

    /// Current display pointer, or `None` when the room does not exist.
    ///
    /// Also asserts that the pointer only references live members and
    /// whiteboards.
    pub async fn display(&self, room_id: &str) -> Option<DisplayPointer> {
        let pointer = self.store.get_room(room_id).await.unwrap()?.display;
        let members = self.members(room_id).await;
        let whiteboards = self.store.list_whiteboards(room_id).await.unwrap();
        assert!(
            display::is_consistent(&pointer, &members, &whiteboards),
            "display {pointer:?} references a departed member or deleted whiteboard"
        );
        Some(pointer)
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.store.get_room(room_id).await.unwrap().is_some()
    }
}

impl Default for TestClassroom {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a join request for a first-time joiner.
pub fn join_request(room_id: &str, user_name: &str, is_audience: bool) -> JoinRequest {
    JoinRequest {
        user_name: user_name.to_string(),
        room_id: room_id.to_string(),
        is_audience,
        existing: None,
    }
}
