//! Classroom controller error types.
//!
//! Every failure of a public room operation is a [`RoomError`]. Each variant
//! belongs to one [`ErrorKind`] and maps to a numeric signaling code.
//! Collaborator reasons and ids are logged server-side and never appear in
//! [`RoomError::client_message`].

use thiserror::Error;

/// Coarse classification of a [`RoomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed arguments, rejected before any mutation.
    Validation,
    /// Room, member, ticket or whiteboard absent.
    NotFound,
    /// Capacity, self-targeting, role transition or permission conflict.
    Conflict,
    /// A collaborator (messaging, whiteboard, credentials, store) failed.
    Upstream,
    /// Unexpected internal fault.
    Internal,
}

/// Classroom controller error type.
///
/// Maps to signaling `ErrorCode` values:
/// - `Validation`: `INVALID_ARGUMENT` (1)
/// - `PermissionDenied`: `FORBIDDEN` (3)
/// - not-found variants: `NOT_FOUND` (4)
/// - conflict variants: `CONFLICT` (5)
/// - `Internal`, `RoomClosed`: `INTERNAL_ERROR` (6)
/// - `OverCapacity`: `CAPACITY_EXCEEDED` (7)
/// - collaborator variants: `UPSTREAM_UNAVAILABLE` (8)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Malformed or missing argument.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// Room does not exist.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// User is not a member of the room.
    #[error("Member not found: {0}")]
    MemberNotFound(String),

    /// Ticket is unknown, already consumed, or expired.
    #[error("Ticket not found")]
    TicketNotFound,

    /// Whiteboard does not exist in the room.
    #[error("Whiteboard not found: {0}")]
    WhiteboardNotFound(String),

    /// The room has no Teacher to display.
    #[error("No teacher in room")]
    TeacherNotFound,

    /// The room has no Assistant to address.
    #[error("No assistant in room")]
    AssistantNotFound,

    /// Seating the member would exceed the non-audience capacity.
    #[error("Room at capacity ({capacity} seats)")]
    OverCapacity { capacity: usize },

    /// The actor named themselves as the target.
    #[error("Operation cannot target the acting user")]
    SelfTarget,

    /// The requested role transition is not allowed from the current role.
    #[error("Illegal role transition: {0}")]
    IllegalRoleTransition(String),

    /// The actor's role does not permit the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Messaging collaborator failed.
    #[error("Messaging error: {0}")]
    Messaging(String),

    /// Whiteboard collaborator failed.
    #[error("Whiteboard error: {0}")]
    Whiteboard(String),

    /// Credential issuer failed.
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Persistence collaborator failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The room actor stopped before handling the request.
    #[error("Room actor closed")]
    RoomClosed,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::Validation(_) => ErrorKind::Validation,
            RoomError::RoomNotFound(_)
            | RoomError::MemberNotFound(_)
            | RoomError::TicketNotFound
            | RoomError::WhiteboardNotFound(_)
            | RoomError::TeacherNotFound
            | RoomError::AssistantNotFound => ErrorKind::NotFound,
            RoomError::OverCapacity { .. }
            | RoomError::SelfTarget
            | RoomError::IllegalRoleTransition(_)
            | RoomError::PermissionDenied(_) => ErrorKind::Conflict,
            RoomError::Messaging(_)
            | RoomError::Whiteboard(_)
            | RoomError::Credentials(_)
            | RoomError::Store(_) => ErrorKind::Upstream,
            RoomError::RoomClosed | RoomError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the signaling `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RoomError::Validation(_) => 1,       // INVALID_ARGUMENT
            RoomError::PermissionDenied(_) => 3, // FORBIDDEN
            RoomError::RoomNotFound(_)
            | RoomError::MemberNotFound(_)
            | RoomError::TicketNotFound
            | RoomError::WhiteboardNotFound(_)
            | RoomError::TeacherNotFound
            | RoomError::AssistantNotFound => 4, // NOT_FOUND
            RoomError::SelfTarget | RoomError::IllegalRoleTransition(_) => 5, // CONFLICT
            RoomError::RoomClosed | RoomError::Internal(_) => 6, // INTERNAL_ERROR
            RoomError::OverCapacity { .. } => 7, // CAPACITY_EXCEEDED
            RoomError::Messaging(_)
            | RoomError::Whiteboard(_)
            | RoomError::Credentials(_)
            | RoomError::Store(_) => 8, // UPSTREAM_UNAVAILABLE
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Validation(reason) => format!("Invalid request: {reason}"),
            RoomError::RoomNotFound(_) => "Room not found".to_string(),
            RoomError::MemberNotFound(_) => "User is not in this room".to_string(),
            RoomError::TicketNotFound => "Request is no longer valid".to_string(),
            RoomError::WhiteboardNotFound(_) => "Whiteboard not found".to_string(),
            RoomError::TeacherNotFound => "There is no teacher in this room".to_string(),
            RoomError::AssistantNotFound => "There is no assistant in this room".to_string(),
            RoomError::OverCapacity { .. } => "Room is full".to_string(),
            RoomError::SelfTarget => "You cannot do this to yourself".to_string(),
            RoomError::IllegalRoleTransition(_) => "Role change not allowed".to_string(),
            RoomError::PermissionDenied(_) => "Permission denied".to_string(),
            RoomError::Messaging(_)
            | RoomError::Whiteboard(_)
            | RoomError::Credentials(_)
            | RoomError::Store(_) => "A dependent service is unavailable".to_string(),
            RoomError::RoomClosed | RoomError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Short, bounded label for metrics.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Internal => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            RoomError::Validation("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(RoomError::TicketNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(RoomError::AssistantNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            RoomError::OverCapacity { capacity: 2 }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(RoomError::SelfTarget.kind(), ErrorKind::Conflict);
        assert_eq!(
            RoomError::PermissionDenied("x".to_string()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RoomError::Messaging("x".to_string()).kind(),
            ErrorKind::Upstream
        );
        assert_eq!(
            RoomError::Store("x".to_string()).kind(),
            ErrorKind::Upstream
        );
        assert_eq!(RoomError::RoomClosed.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(RoomError::Validation("x".to_string()).error_code(), 1);
        assert_eq!(
            RoomError::PermissionDenied("x".to_string()).error_code(),
            3
        );
        assert_eq!(RoomError::RoomNotFound("r".to_string()).error_code(), 4);
        assert_eq!(RoomError::TicketNotFound.error_code(), 4);
        assert_eq!(RoomError::SelfTarget.error_code(), 5);
        assert_eq!(RoomError::Internal("x".to_string()).error_code(), 6);
        assert_eq!(RoomError::OverCapacity { capacity: 4 }.error_code(), 7);
        assert_eq!(RoomError::Whiteboard("x".to_string()).error_code(), 8);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = RoomError::Messaging("connection refused to 10.0.0.7:9000".to_string());
        assert!(!err.client_message().contains("10.0.0.7"));

        let err = RoomError::MemberNotFound("user-42".to_string());
        assert!(!err.client_message().contains("user-42"));

        let err = RoomError::Internal("lock poisoned".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", RoomError::OverCapacity { capacity: 2 }),
            "Room at capacity (2 seats)"
        );
        assert_eq!(
            format!("{}", RoomError::RoomNotFound("math-101".to_string())),
            "Room not found: math-101"
        );
        assert_eq!(format!("{}", RoomError::TicketNotFound), "Ticket not found");
    }
}
