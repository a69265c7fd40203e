//! Actor hierarchy for per-room serialization.
//!
//! ```text
//! RoomControllerActor (singleton)
//! ├── RoomActor (room-a)
//! ├── RoomActor (room-b)
//! └── ...
//! ```
//!
//! Every operation on a room runs inside that room's actor, one message at a
//! time. Rooms are independent actors and run in parallel. Cancellation
//! flows from the controller's root token to each room's child token.

pub mod controller;
pub mod messages;
pub mod metrics;
pub mod room;
mod whiteboards;
mod workflows;

pub use controller::RoomControllerHandle;
pub use messages::{
    ControllerStatus, Identity, JoinRequest, JoinResult, RoomStatus, WhiteboardInfo,
};
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use room::{RoomActorHandle, RoomPolicy, RoomServices};
pub use whiteboards::whiteboard_name;
