//! Classroom Controller Library
//!
//! Coordinates live virtual-classroom rooms:
//!
//! - Room and membership lifecycle (create on first join, tear down when empty)
//! - Ranked roles with seat capacity and single Teacher/Assistant ownership
//! - One shared display pointer per room, cleared when its owner leaves
//! - One-shot expiring approval tickets for speech, device control and role
//!   upgrades
//! - Outbound notifications through the messaging collaborator
//!
//! # Architecture
//!
//! ```text
//! RoomControllerActor (singleton)
//! ├── routes each request to its room's actor
//! └── RoomActor (one per live room)
//!     ├── RoomStore        (rooms, members, whiteboards)
//!     ├── TicketStore      (pending approval tickets, shared)
//!     ├── Notifier         (messaging collaborator)
//!     ├── WhiteboardClient (whiteboard sessions)
//!     └── CredentialIssuer (session and messaging tokens)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Per-room actors and the public operation surface
//! - [`config`] - Service configuration from environment
//! - [`display`] - Display pointer and its re-evaluation rules
//! - [`errors`] - Error types with error kinds and codes
//! - [`roles`] - Role ranking, capacity and permission rules
//! - [`tickets`] - Approval ticket store
//! - [`tasks`] - Background tasks

pub mod actors;
pub mod config;
pub mod display;
pub mod errors;
pub mod notifications;
pub mod observability;
pub mod roles;
pub mod services;
pub mod store;
pub mod tasks;
pub mod tickets;
