//! Message types for actor communication.
//!
//! Every request carries a `respond_to` oneshot so the caller can await the
//! actor's reply. A dropped reply channel means the actor stopped before
//! handling the request; callers see that as [`RoomError::RoomClosed`].

use super::room::RoomActorHandle;
use crate::display::{DisplayKind, DisplayPointer};
use crate::errors::RoomError;
use crate::roles::{DeviceType, Role};
use crate::store::{MemberRecord, WhiteboardRecord};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Reply channel for a room operation.
pub type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

/// Messages handled by the `RoomControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Resolve the actor serving `room_id`, spawning one when `create` is
    /// set or the room already exists in the store.
    Route {
        room_id: String,
        create: bool,
        respond_to: Reply<RoomActorHandle>,
    },

    /// Controller status snapshot.
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Stop accepting work and cancel every room actor.
    Shutdown { respond_to: Reply<()> },
}

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    Join {
        request: JoinRequest,
        respond_to: Reply<JoinResult>,
    },
    Leave {
        identity: Identity,
        respond_to: Reply<()>,
    },
    Kick {
        actor_id: String,
        target_id: String,
        respond_to: Reply<()>,
    },
    Downgrade {
        actor_id: String,
        target_ids: Vec<String>,
        respond_to: Reply<bool>,
    },
    Transfer {
        actor_id: String,
        target_id: String,
        respond_to: Reply<()>,
    },
    ChangeRole {
        actor_id: String,
        target_id: String,
        role: Role,
        respond_to: Reply<()>,
    },
    InviteUpgrade {
        actor_id: String,
        target_id: String,
        role: Role,
        respond_to: Reply<String>,
    },
    ApproveUpgrade {
        actor_id: String,
        ticket_id: String,
        respond_to: Reply<()>,
    },
    RejectUpgrade {
        actor_id: String,
        ticket_id: String,
        respond_to: Reply<()>,
    },
    ApplySpeech {
        actor_id: String,
        respond_to: Reply<String>,
    },
    ApproveSpeech {
        actor_id: String,
        ticket_id: String,
        respond_to: Reply<()>,
    },
    RejectSpeech {
        actor_id: String,
        ticket_id: String,
        respond_to: Reply<()>,
    },
    /// Returns the ticket id for an enable request, `None` for a disable.
    ControlDevice {
        actor_id: String,
        target_id: String,
        device: DeviceType,
        enable: bool,
        respond_to: Reply<Option<String>>,
    },
    ApproveDevice {
        actor_id: String,
        ticket_id: String,
        respond_to: Reply<()>,
    },
    RejectDevice {
        actor_id: String,
        ticket_id: String,
        respond_to: Reply<()>,
    },
    SyncDevice {
        actor_id: String,
        device: DeviceType,
        enabled: bool,
        respond_to: Reply<()>,
    },
    SetDisplay {
        actor_id: String,
        kind: DisplayKind,
        reference: Option<String>,
        respond_to: Reply<DisplayPointer>,
    },
    CreateWhiteboard {
        actor_id: String,
        respond_to: Reply<WhiteboardInfo>,
    },
    DeleteWhiteboard {
        actor_id: String,
        whiteboard_id: String,
        respond_to: Reply<()>,
    },
    TurnPage {
        actor_id: String,
        whiteboard_id: String,
        page: u32,
        respond_to: Reply<()>,
    },
    ListWhiteboards {
        respond_to: Reply<Vec<WhiteboardInfo>>,
    },
    GetMembers {
        respond_to: Reply<Vec<MemberRecord>>,
    },
    GetStatus {
        respond_to: Reply<RoomStatus>,
    },
    /// Administrative teardown regardless of membership.
    Destroy {
        reason: String,
        respond_to: Reply<()>,
    },
}

/// A caller's identity within one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
    pub room_id: String,
}

/// Arguments of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub user_name: String,
    pub room_id: String,
    pub is_audience: bool,
    /// Identity from an earlier join, reused when name and room match.
    pub existing: Option<Identity>,
}

/// Everything a client needs after joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinResult {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub display: DisplayPointer,
    pub members: Vec<MemberRecord>,
    pub whiteboards: Vec<WhiteboardInfo>,
    pub session_token: String,
    pub messaging_token: String,
}

impl JoinResult {
    #[must_use]
    pub fn identity(&self, room_id: &str) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            room_id: room_id.to_string(),
        }
    }
}

/// Public view of a whiteboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhiteboardInfo {
    pub whiteboard_id: String,
    pub name: String,
    pub current_page: u32,
}

impl From<&WhiteboardRecord> for WhiteboardInfo {
    fn from(record: &WhiteboardRecord) -> Self {
        Self {
            whiteboard_id: record.whiteboard_id.clone(),
            name: record.name.clone(),
            current_page: record.current_page,
        }
    }
}

/// Snapshot of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomStatus {
    pub room_id: String,
    pub member_count: usize,
    pub seated_count: usize,
    pub display: DisplayPointer,
    pub whiteboard_count: usize,
    pub pending_tickets: usize,
    pub mailbox_depth: usize,
}

/// Snapshot of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub instance_id: String,
    pub room_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}
