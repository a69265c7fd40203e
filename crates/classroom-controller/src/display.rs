//! The room's single display pointer.
//!
//! The pointer is a structured enum everywhere inside the crate and is only
//! turned into the `display://type=N?userId=X?uri=Y` wire string when it is
//! serialized for the messaging collaborator.
//!
//! Re-evaluation rules applied after membership or role changes:
//! - a Teacher leaving (or losing the role) clears a pointer that points at
//!   them, unless it is a whiteboard and an Assistant is still present
//! - an Assistant leaving (or losing the role) clears a pointer that points
//!   at them
//! - any departed or demoted-to-audience owner of a Teacher, Assistant or
//!   Screen pointer clears it
//! - deleting a whiteboard clears a pointer that shows it

use crate::errors::RoomError;
use crate::roles::{find_member, holder_of, Role};
use crate::store::{MemberRecord, WhiteboardRecord};
use serde::{Serialize, Serializer};
use std::fmt;

/// What the room is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DisplayPointer {
    #[default]
    None,
    Teacher {
        user_id: String,
    },
    Assistant {
        user_id: String,
    },
    Screen {
        user_id: String,
    },
    Whiteboard {
        whiteboard_id: String,
        /// Creator who put a new whiteboard on display. `None` when the
        /// whiteboard was chosen explicitly.
        presenter_id: Option<String>,
    },
}

impl DisplayPointer {
    /// The member a Teacher, Assistant or Screen pointer belongs to.
    #[must_use]
    pub fn owner_id(&self) -> Option<&str> {
        match self {
            DisplayPointer::Teacher { user_id }
            | DisplayPointer::Assistant { user_id }
            | DisplayPointer::Screen { user_id } => Some(user_id),
            DisplayPointer::None | DisplayPointer::Whiteboard { .. } => None,
        }
    }

    /// Whether the pointer is associated with `user_id`, either as owner or
    /// as whiteboard presenter.
    #[must_use]
    pub fn points_at(&self, user_id: &str) -> bool {
        match self {
            DisplayPointer::Whiteboard { presenter_id, .. } => {
                presenter_id.as_deref() == Some(user_id)
            }
            other => other.owner_id() == Some(user_id),
        }
    }

    #[must_use]
    pub fn whiteboard_id(&self) -> Option<&str> {
        match self {
            DisplayPointer::Whiteboard { whiteboard_id, .. } => Some(whiteboard_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, DisplayPointer::None)
    }

    fn wire_type(&self) -> Option<u8> {
        match self {
            DisplayPointer::Assistant { .. } => Some(0),
            DisplayPointer::Teacher { .. } => Some(1),
            DisplayPointer::Whiteboard { .. } => Some(2),
            DisplayPointer::Screen { .. } => Some(3),
            DisplayPointer::None => None,
        }
    }

    /// Wire encoding. `None` encodes as the empty string.
    #[must_use]
    pub fn to_wire(&self) -> String {
        let Some(kind) = self.wire_type() else {
            return String::new();
        };
        let (user, uri) = match self {
            DisplayPointer::Whiteboard {
                whiteboard_id,
                presenter_id,
            } => (presenter_id.as_deref().unwrap_or(""), whiteboard_id.as_str()),
            other => (other.owner_id().unwrap_or(""), ""),
        };
        format!("display://type={kind}?userId={user}?uri={uri}")
    }
}

impl fmt::Display for DisplayPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for DisplayPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

/// Kind requested by an explicit set-display call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    None,
    Teacher,
    Assistant,
    Screen,
    Whiteboard,
}

impl TryFrom<i32> for DisplayKind {
    type Error = RoomError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DisplayKind::Assistant),
            1 => Ok(DisplayKind::Teacher),
            2 => Ok(DisplayKind::Whiteboard),
            3 => Ok(DisplayKind::Screen),
            4 => Ok(DisplayKind::None),
            other => Err(RoomError::Validation(format!("unknown display type {other}"))),
        }
    }
}

/// Build the pointer for an explicit set-display request, validating that
/// the referenced member or whiteboard exists in the room.
///
/// An explicitly chosen whiteboard has no presenter, so it stays up until the
/// whiteboard is deleted or the display is changed.
///
/// # Errors
///
/// - `TeacherNotFound` / `AssistantNotFound` when that role is vacant
/// - `Validation` when a Screen or Whiteboard request lacks its reference
/// - `MemberNotFound` / `WhiteboardNotFound` when the reference is unknown
pub fn resolve(
    kind: DisplayKind,
    reference: Option<&str>,
    members: &[MemberRecord],
    whiteboards: &[WhiteboardRecord],
) -> Result<DisplayPointer, RoomError> {
    match kind {
        DisplayKind::None => Ok(DisplayPointer::None),
        DisplayKind::Teacher => holder_of(members, Role::Teacher)
            .map(|m| DisplayPointer::Teacher {
                user_id: m.user_id.clone(),
            })
            .ok_or(RoomError::TeacherNotFound),
        DisplayKind::Assistant => holder_of(members, Role::Assistant)
            .map(|m| DisplayPointer::Assistant {
                user_id: m.user_id.clone(),
            })
            .ok_or(RoomError::AssistantNotFound),
        DisplayKind::Screen => {
            let user_id = non_empty(reference, "screen display requires a user id")?;
            find_member(members, user_id)
                .map(|m| DisplayPointer::Screen {
                    user_id: m.user_id.clone(),
                })
                .ok_or_else(|| RoomError::MemberNotFound(user_id.to_string()))
        }
        DisplayKind::Whiteboard => {
            let whiteboard_id = non_empty(reference, "whiteboard display requires a uri")?;
            if !whiteboards.iter().any(|w| w.whiteboard_id == whiteboard_id) {
                return Err(RoomError::WhiteboardNotFound(whiteboard_id.to_string()));
            }
            Ok(DisplayPointer::Whiteboard {
                whiteboard_id: whiteboard_id.to_string(),
                presenter_id: None,
            })
        }
    }
}

fn non_empty<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, RoomError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RoomError::Validation(message.to_string())),
    }
}

/// Pointer after `user_id` changed from `old_role` to `new_role`.
///
/// `members` is the membership after the change. Returns `Some` only when
/// the pointer must change.
#[must_use]
pub fn after_role_change(
    current: &DisplayPointer,
    user_id: &str,
    old_role: Role,
    new_role: Role,
    members: &[MemberRecord],
) -> Option<DisplayPointer> {
    if old_role == new_role || !current.points_at(user_id) {
        return None;
    }
    let assistant_present = holder_of(members, Role::Assistant).is_some();
    let clear = match old_role {
        Role::Teacher => current.whiteboard_id().is_none() || !assistant_present,
        Role::Assistant => true,
        Role::Student | Role::Audience => {
            new_role == Role::Audience && current.owner_id() == Some(user_id)
        }
    };
    clear.then_some(DisplayPointer::None)
}

/// Pointer after `user_id` (who held `role`) left the room.
///
/// `members` is the membership after the departure.
#[must_use]
pub fn after_departure(
    current: &DisplayPointer,
    user_id: &str,
    role: Role,
    members: &[MemberRecord],
) -> Option<DisplayPointer> {
    if !current.points_at(user_id) {
        return None;
    }
    let assistant_present = holder_of(members, Role::Assistant).is_some();
    let clear = match role {
        Role::Teacher => current.whiteboard_id().is_none() || !assistant_present,
        Role::Assistant => true,
        Role::Student | Role::Audience => current.owner_id() == Some(user_id),
    };
    clear.then_some(DisplayPointer::None)
}

/// Pointer after a whiteboard was deleted.
#[must_use]
pub fn after_whiteboard_deleted(
    current: &DisplayPointer,
    whiteboard_id: &str,
) -> Option<DisplayPointer> {
    (current.whiteboard_id() == Some(whiteboard_id)).then_some(DisplayPointer::None)
}

/// Whether `pointer` only references live members and whiteboards.
#[must_use]
pub fn is_consistent(
    pointer: &DisplayPointer,
    members: &[MemberRecord],
    whiteboards: &[WhiteboardRecord],
) -> bool {
    match pointer {
        DisplayPointer::None => true,
        DisplayPointer::Whiteboard { whiteboard_id, .. } => whiteboards
            .iter()
            .any(|w| &w.whiteboard_id == whiteboard_id),
        other => other
            .owner_id()
            .is_some_and(|owner| find_member(members, owner).is_some()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(user_id: &str, role: Role) -> MemberRecord {
        MemberRecord {
            room_id: "room-1".to_string(),
            user_id: user_id.to_string(),
            user_name: user_id.to_string(),
            role,
            camera_enabled: true,
            mic_enabled: true,
            joined_at: Utc::now(),
        }
    }

    fn board(id: &str) -> WhiteboardRecord {
        WhiteboardRecord {
            whiteboard_id: id.to_string(),
            room_id: "room-1".to_string(),
            creator_id: "t".to_string(),
            session_token: "tok".to_string(),
            name: "7".to_string(),
            current_page: 0,
            created_at: Utc::now(),
        }
    }

    fn teacher_board() -> DisplayPointer {
        DisplayPointer::Whiteboard {
            whiteboard_id: "w1".to_string(),
            presenter_id: Some("t".to_string()),
        }
    }

    #[test]
    fn test_wire_encoding() {
        assert_eq!(DisplayPointer::None.to_wire(), "");
        assert_eq!(
            DisplayPointer::Teacher {
                user_id: "t".to_string()
            }
            .to_wire(),
            "display://type=1?userId=t?uri="
        );
        assert_eq!(
            DisplayPointer::Assistant {
                user_id: "a".to_string()
            }
            .to_wire(),
            "display://type=0?userId=a?uri="
        );
        assert_eq!(teacher_board().to_wire(), "display://type=2?userId=t?uri=w1");
        assert_eq!(
            serde_json::to_string(&DisplayPointer::Screen {
                user_id: "s".to_string()
            })
            .unwrap(),
            "\"display://type=3?userId=s?uri=\""
        );
    }

    #[test]
    fn test_display_kind_wire_values() {
        assert_eq!(DisplayKind::try_from(0).unwrap(), DisplayKind::Assistant);
        assert_eq!(DisplayKind::try_from(4).unwrap(), DisplayKind::None);
        assert!(DisplayKind::try_from(5).is_err());
    }

    #[test]
    fn test_resolve_role_holders() {
        let members = vec![member("a", Role::Assistant), member("s", Role::Student)];
        assert_eq!(
            resolve(DisplayKind::Assistant, None, &members, &[]).unwrap(),
            DisplayPointer::Assistant {
                user_id: "a".to_string()
            }
        );
        assert_eq!(
            resolve(DisplayKind::Teacher, None, &members, &[]),
            Err(RoomError::TeacherNotFound)
        );
        assert_eq!(
            resolve(DisplayKind::None, None, &members, &[]).unwrap(),
            DisplayPointer::None
        );
    }

    #[test]
    fn test_resolve_screen_and_whiteboard_references() {
        let members = vec![member("a", Role::Assistant), member("s", Role::Student)];
        let boards = vec![board("w1")];

        assert!(matches!(
            resolve(DisplayKind::Screen, None, &members, &boards),
            Err(RoomError::Validation(_))
        ));
        assert!(matches!(
            resolve(DisplayKind::Screen, Some("ghost"), &members, &boards),
            Err(RoomError::MemberNotFound(_))
        ));
        assert_eq!(
            resolve(DisplayKind::Screen, Some("s"), &members, &boards).unwrap(),
            DisplayPointer::Screen {
                user_id: "s".to_string()
            }
        );
        assert!(matches!(
            resolve(DisplayKind::Whiteboard, Some("w9"), &members, &boards),
            Err(RoomError::WhiteboardNotFound(_))
        ));
        assert_eq!(
            resolve(DisplayKind::Whiteboard, Some("w1"), &members, &boards).unwrap(),
            DisplayPointer::Whiteboard {
                whiteboard_id: "w1".to_string(),
                presenter_id: None
            }
        );
    }

    #[test]
    fn test_teacher_departure_keeps_whiteboard_with_assistant() {
        let remaining = vec![member("a", Role::Assistant)];
        assert_eq!(
            after_departure(&teacher_board(), "t", Role::Teacher, &remaining),
            None
        );
    }

    #[test]
    fn test_teacher_departure_clears_whiteboard_without_assistant() {
        let remaining = vec![member("s", Role::Student)];
        assert_eq!(
            after_departure(&teacher_board(), "t", Role::Teacher, &remaining),
            Some(DisplayPointer::None)
        );
    }

    #[test]
    fn test_teacher_departure_clears_teacher_pointer() {
        let pointer = DisplayPointer::Teacher {
            user_id: "t".to_string(),
        };
        let remaining = vec![member("a", Role::Assistant)];
        assert_eq!(
            after_departure(&pointer, "t", Role::Teacher, &remaining),
            Some(DisplayPointer::None)
        );
    }

    #[test]
    fn test_assistant_departure_clears_only_own_pointer() {
        let own = DisplayPointer::Assistant {
            user_id: "a".to_string(),
        };
        assert_eq!(
            after_departure(&own, "a", Role::Assistant, &[]),
            Some(DisplayPointer::None)
        );
        assert_eq!(after_departure(&teacher_board(), "a", Role::Assistant, &[]), None);
    }

    #[test]
    fn test_screen_owner_departure_clears() {
        let pointer = DisplayPointer::Screen {
            user_id: "s".to_string(),
        };
        assert_eq!(
            after_departure(&pointer, "s", Role::Student, &[]),
            Some(DisplayPointer::None)
        );
        assert_eq!(after_departure(&pointer, "x", Role::Student, &[]), None);
    }

    #[test]
    fn test_role_change_rules() {
        let assistant_pointer = DisplayPointer::Assistant {
            user_id: "a".to_string(),
        };
        assert_eq!(
            after_role_change(&assistant_pointer, "a", Role::Assistant, Role::Student, &[]),
            Some(DisplayPointer::None)
        );

        let with_assistant = vec![member("a", Role::Assistant), member("t", Role::Audience)];
        assert_eq!(
            after_role_change(
                &teacher_board(),
                "t",
                Role::Teacher,
                Role::Audience,
                &with_assistant
            ),
            None
        );

        let screen = DisplayPointer::Screen {
            user_id: "s".to_string(),
        };
        assert_eq!(
            after_role_change(&screen, "s", Role::Student, Role::Audience, &[]),
            Some(DisplayPointer::None)
        );
        assert_eq!(
            after_role_change(&screen, "s", Role::Audience, Role::Student, &[]),
            None
        );
    }

    #[test]
    fn test_whiteboard_deletion() {
        assert_eq!(
            after_whiteboard_deleted(&teacher_board(), "w1"),
            Some(DisplayPointer::None)
        );
        assert_eq!(after_whiteboard_deleted(&teacher_board(), "w2"), None);
    }

    #[test]
    fn test_consistency_check() {
        let members = vec![member("t", Role::Teacher)];
        let boards = vec![board("w1")];
        assert!(is_consistent(&teacher_board(), &members, &boards));
        assert!(!is_consistent(&teacher_board(), &members, &[]));
        assert!(!is_consistent(
            &DisplayPointer::Screen {
                user_id: "gone".to_string()
            },
            &members,
            &boards
        ));
    }
}
