//! # Classroom Test Utilities
//!
//! Shared test utilities for the Classroom Controller.
//!
//! This crate provides recording mocks for the collaborators a room actor
//! talks to, and a harness that wires them into a running
//! [`RoomControllerHandle`](classroom_controller::actors::RoomControllerHandle).
//!
//! ## Modules
//!
//! - `mock_messaging` - Records group calls and published notifications
//! - `mock_whiteboard` - Hands out whiteboard ids and records destroys
//! - `mock_credentials` - Deterministic session and messaging tokens
//! - `fixtures` - `TestClassroom` harness and join helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use classroom_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let classroom = TestClassroom::builder().capacity(2).build();
//!
//!     let assistant = classroom.join("room-1", "alice").await.unwrap();
//!     assert_eq!(assistant.role, Role::Assistant);
//!
//!     // Every notification the room emitted is on the mock
//!     assert_eq!(classroom.messaging.events_named("member_changed").len(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_credentials;
pub mod mock_messaging;
pub mod mock_whiteboard;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_credentials::*;
pub use mock_messaging::*;
pub use mock_whiteboard::*;
