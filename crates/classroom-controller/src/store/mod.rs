//! Persistence collaborator.
//!
//! Keyed CRUD over rooms, members and whiteboards. The store offers
//! insert-if-absent for rooms and members; emptiness checks and every other
//! rule are computed by the room actor, not the store.

mod memory;

pub use memory::InMemoryRoomStore;

use crate::display::DisplayPointer;
use crate::errors::RoomError;
use crate::roles::{DeviceType, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A classroom room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomRecord {
    pub room_id: String,
    pub display: DisplayPointer,
    pub created_at: DateTime<Utc>,
}

impl RoomRecord {
    #[must_use]
    pub fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            display: DisplayPointer::None,
            created_at: Utc::now(),
        }
    }
}

/// A user's participation in a room. Unique per `(room_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub room_id: String,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub camera_enabled: bool,
    pub mic_enabled: bool,
    pub joined_at: DateTime<Utc>,
}

impl MemberRecord {
    #[must_use]
    pub fn device_enabled(&self, device: DeviceType) -> bool {
        match device {
            DeviceType::Camera => self.camera_enabled,
            DeviceType::Microphone => self.mic_enabled,
        }
    }

    pub fn set_device(&mut self, device: DeviceType, enabled: bool) {
        match device {
            DeviceType::Camera => self.camera_enabled = enabled,
            DeviceType::Microphone => self.mic_enabled = enabled,
        }
    }
}

/// A whiteboard session opened in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhiteboardRecord {
    /// Id returned by the whiteboard collaborator; also the display uri.
    pub whiteboard_id: String,
    pub room_id: String,
    pub creator_id: String,
    /// Opaque token the collaborator session was created under.
    #[serde(skip_serializing)]
    pub session_token: String,
    pub name: String,
    pub current_page: u32,
    pub created_at: DateTime<Utc>,
}

/// Storage for room state.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Insert `room` unless a room with the same id exists. Returns whether
    /// the insert happened.
    async fn insert_room_if_absent(&self, room: RoomRecord) -> Result<bool, RoomError>;

    async fn get_room(&self, room_id: &str) -> Result<Option<RoomRecord>, RoomError>;

    /// Replace the room's display pointer.
    async fn set_display(&self, room_id: &str, display: DisplayPointer) -> Result<(), RoomError>;

    /// Delete the room record. Returns whether it existed.
    async fn delete_room(&self, room_id: &str) -> Result<bool, RoomError>;

    /// Insert `member` unless `(room_id, user_id)` exists. Returns whether
    /// the insert happened.
    async fn insert_member_if_absent(&self, member: MemberRecord) -> Result<bool, RoomError>;

    async fn get_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRecord>, RoomError>;

    /// Members of a room in join order.
    async fn list_members(&self, room_id: &str) -> Result<Vec<MemberRecord>, RoomError>;

    /// Overwrite an existing member's mutable fields (role, device flags).
    async fn update_member(&self, member: &MemberRecord) -> Result<(), RoomError>;

    /// Delete one member. Returns whether it existed.
    async fn delete_member(&self, room_id: &str, user_id: &str) -> Result<bool, RoomError>;

    /// Delete every member of a room. Returns how many were removed.
    async fn delete_members(&self, room_id: &str) -> Result<usize, RoomError>;

    async fn insert_whiteboard(&self, whiteboard: WhiteboardRecord) -> Result<(), RoomError>;

    async fn get_whiteboard(
        &self,
        room_id: &str,
        whiteboard_id: &str,
    ) -> Result<Option<WhiteboardRecord>, RoomError>;

    async fn list_whiteboards(&self, room_id: &str) -> Result<Vec<WhiteboardRecord>, RoomError>;

    /// Set a whiteboard's current page. Returns whether it existed.
    async fn set_whiteboard_page(
        &self,
        room_id: &str,
        whiteboard_id: &str,
        page: u32,
    ) -> Result<bool, RoomError>;

    /// Delete one whiteboard. Returns whether it existed.
    async fn delete_whiteboard(&self, room_id: &str, whiteboard_id: &str)
        -> Result<bool, RoomError>;

    /// Delete every whiteboard of a room, returning the removed records.
    async fn delete_whiteboards(&self, room_id: &str) -> Result<Vec<WhiteboardRecord>, RoomError>;
}
