//! Role ranking, seat capacity and permission rules.
//!
//! Everything here is a pure function over a room's member list. The room
//! actor calls these while it holds the room exclusively, so a check and the
//! mutation that follows it cannot interleave with another operation on the
//! same room.

use crate::errors::RoomError;
use crate::store::MemberRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Participation level inside a room.
///
/// Ordered by [`Role::rank`]: Teacher > Assistant > Student > Audience.
/// Serialized as its raw wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Role {
    Teacher,
    Assistant,
    Student,
    Audience,
}

impl Role {
    /// Privilege rank; higher is more privileged.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Role::Teacher => 3,
            Role::Assistant => 2,
            Role::Student => 1,
            Role::Audience => 0,
        }
    }

    /// Raw value used on the wire. Lower is more privileged, except that
    /// Assistant (1) sorts ahead of Teacher (2).
    #[must_use]
    pub const fn wire_value(self) -> i32 {
        match self {
            Role::Assistant => 1,
            Role::Teacher => 2,
            Role::Student => 3,
            Role::Audience => 4,
        }
    }

    /// Parse a raw wire value.
    #[must_use]
    pub const fn from_wire_value(value: i32) -> Option<Role> {
        match value {
            1 => Some(Role::Assistant),
            2 => Some(Role::Teacher),
            3 => Some(Role::Student),
            4 => Some(Role::Audience),
            _ => None,
        }
    }

    /// Whether the role counts against the room's seat capacity.
    #[must_use]
    pub const fn occupies_seat(self) -> bool {
        !matches!(self, Role::Audience)
    }

    /// Whether at most one member may hold this role.
    #[must_use]
    pub const fn is_exclusive(self) -> bool {
        matches!(self, Role::Teacher | Role::Assistant)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Assistant => "assistant",
            Role::Student => "student",
            Role::Audience => "audience",
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Role> for i32 {
    fn from(role: Role) -> Self {
        role.wire_value()
    }
}

impl TryFrom<i32> for Role {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Role::from_wire_value(value).ok_or_else(|| format!("unknown role value {value}"))
    }
}

/// A member's media device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum DeviceType {
    Camera,
    Microphone,
}

impl DeviceType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DeviceType::Camera => "camera",
            DeviceType::Microphone => "microphone",
        }
    }
}

impl From<DeviceType> for i32 {
    fn from(device: DeviceType) -> Self {
        match device {
            DeviceType::Camera => 0,
            DeviceType::Microphone => 1,
        }
    }
}

impl TryFrom<i32> for DeviceType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DeviceType::Camera),
            1 => Ok(DeviceType::Microphone),
            other => Err(format!("unknown device value {other}")),
        }
    }
}

/// Number of members holding a seat (any role but Audience).
#[must_use]
pub fn seated_count(members: &[MemberRecord]) -> usize {
    members.iter().filter(|m| m.role.occupies_seat()).count()
}

/// The member currently holding `role`, if any.
#[must_use]
pub fn holder_of(members: &[MemberRecord], role: Role) -> Option<&MemberRecord> {
    members.iter().find(|m| m.role == role)
}

/// Look up a member by user id.
#[must_use]
pub fn find_member<'a>(members: &'a [MemberRecord], user_id: &str) -> Option<&'a MemberRecord> {
    members.iter().find(|m| m.user_id == user_id)
}

/// Role for a first-time joiner.
///
/// Audience requests always get Audience. Everyone else becomes the
/// Assistant when the room has none, otherwise a Student.
#[must_use]
pub fn assign_join_role(members: &[MemberRecord], wants_audience: bool) -> Role {
    if wants_audience {
        Role::Audience
    } else if holder_of(members, Role::Assistant).is_none() {
        Role::Assistant
    } else {
        Role::Student
    }
}

/// Capacity rule: seating `subject_id` must not push the seated count past
/// `capacity`. A subject who already holds a seat never increases the count.
///
/// # Errors
///
/// Returns `OverCapacity` when the seat is not available.
pub fn check_capacity(
    members: &[MemberRecord],
    subject_id: &str,
    capacity: usize,
) -> Result<(), RoomError> {
    let already_seated = find_member(members, subject_id).is_some_and(|m| m.role.occupies_seat());
    if already_seated {
        return Ok(());
    }
    if seated_count(members).saturating_add(1) > capacity {
        return Err(RoomError::OverCapacity { capacity });
    }
    Ok(())
}

/// Admission check for a ticketed role upgrade.
///
/// An Audience target is subject to the capacity rule. Any other target is
/// refused when the requested role's raw wire value is greater than their
/// current one. The comparison deliberately uses raw values, not
/// [`Role::rank`], so Assistant to Teacher is refused while Teacher to
/// Assistant passes.
///
/// # Errors
///
/// `OverCapacity` or `IllegalRoleTransition`.
pub fn check_upgrade_admissible(
    members: &[MemberRecord],
    target: &MemberRecord,
    requested: Role,
    capacity: usize,
) -> Result<(), RoomError> {
    if target.role == Role::Audience {
        check_capacity(members, &target.user_id, capacity)
    } else if requested.wire_value() > target.role.wire_value() {
        Err(RoomError::IllegalRoleTransition(format!(
            "cannot move from {} to {}",
            target.role, requested
        )))
    } else {
        Ok(())
    }
}

/// Refuse to hand an exclusive role to `user_id` while someone else holds it.
///
/// # Errors
///
/// Returns `IllegalRoleTransition` when the role is taken.
pub fn check_role_vacant(
    members: &[MemberRecord],
    user_id: &str,
    role: Role,
) -> Result<(), RoomError> {
    if !role.is_exclusive() {
        return Ok(());
    }
    match holder_of(members, role) {
        Some(holder) if holder.user_id != user_id => Err(RoomError::IllegalRoleTransition(
            format!("room already has a {role}"),
        )),
        _ => Ok(()),
    }
}

/// Resolve the acting member and check their role is in `allowed`.
///
/// # Errors
///
/// Returns `PermissionDenied` if the actor is not a member or holds a role
/// outside `allowed`.
pub fn require_role<'a>(
    members: &'a [MemberRecord],
    actor_id: &str,
    allowed: &[Role],
    operation: &str,
) -> Result<&'a MemberRecord, RoomError> {
    let actor = find_member(members, actor_id).ok_or_else(|| {
        RoomError::PermissionDenied(format!("{operation}: actor is not in the room"))
    })?;
    if !allowed.contains(&actor.role) {
        return Err(RoomError::PermissionDenied(format!(
            "{operation} not allowed for {}",
            actor.role
        )));
    }
    Ok(actor)
}

/// Roles allowed to manage other members and the display.
pub const STAFF: &[Role] = &[Role::Teacher, Role::Assistant];

/// Roles that may publish media.
pub const SEATED: &[Role] = &[Role::Teacher, Role::Assistant, Role::Student];

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(user_id: &str, role: Role) -> MemberRecord {
        MemberRecord {
            room_id: "room-1".to_string(),
            user_id: user_id.to_string(),
            user_name: user_id.to_uppercase(),
            role,
            camera_enabled: true,
            mic_enabled: true,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn test_rank_order() {
        assert!(Role::Teacher > Role::Assistant);
        assert!(Role::Assistant > Role::Student);
        assert!(Role::Student > Role::Audience);
        let mut roles = vec![Role::Student, Role::Teacher, Role::Audience, Role::Assistant];
        roles.sort();
        assert_eq!(
            roles,
            vec![Role::Audience, Role::Student, Role::Assistant, Role::Teacher]
        );
    }

    #[test]
    fn test_role_wire_values() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Role>("2").unwrap(), Role::Teacher);
        assert!(serde_json::from_str::<Role>("9").is_err());
        assert_eq!(serde_json::to_string(&DeviceType::Microphone).unwrap(), "1");
    }

    #[test]
    fn test_join_assignment() {
        assert_eq!(assign_join_role(&[], false), Role::Assistant);
        assert_eq!(assign_join_role(&[], true), Role::Audience);

        let members = vec![member("a", Role::Assistant)];
        assert_eq!(assign_join_role(&members, false), Role::Student);
        assert_eq!(assign_join_role(&members, true), Role::Audience);
    }

    #[test]
    fn test_capacity_counts_only_seats() {
        let members = vec![
            member("a", Role::Assistant),
            member("s", Role::Student),
            member("x", Role::Audience),
        ];
        assert_eq!(seated_count(&members), 2);
        assert!(check_capacity(&members, "new", 3).is_ok());
        assert_eq!(
            check_capacity(&members, "new", 2),
            Err(RoomError::OverCapacity { capacity: 2 })
        );
        // An audience member taking a seat also needs a free one.
        assert!(check_capacity(&members, "x", 2).is_err());
    }

    #[test]
    fn test_capacity_seated_subject_never_increases_count() {
        let members = vec![member("a", Role::Assistant), member("s", Role::Student)];
        assert!(check_capacity(&members, "s", 2).is_ok());
        assert!(check_capacity(&members, "s", 1).is_ok());
    }

    #[test]
    fn test_upgrade_admissible_uses_raw_values() {
        let members = vec![
            member("a", Role::Assistant),
            member("t", Role::Teacher),
            member("s", Role::Student),
        ];
        let student = find_member(&members, "s").unwrap();
        assert!(check_upgrade_admissible(&members, student, Role::Teacher, 10).is_ok());
        assert!(check_upgrade_admissible(&members, student, Role::Audience, 10).is_err());

        // Assistant (1) to Teacher (2) is refused by the raw comparison.
        let assistant = find_member(&members, "a").unwrap();
        assert!(matches!(
            check_upgrade_admissible(&members, assistant, Role::Teacher, 10),
            Err(RoomError::IllegalRoleTransition(_))
        ));

        // Teacher (2) to Assistant (1) passes.
        let teacher = find_member(&members, "t").unwrap();
        assert!(check_upgrade_admissible(&members, teacher, Role::Assistant, 10).is_ok());
    }

    #[test]
    fn test_upgrade_admissible_audience_hits_capacity() {
        let members = vec![member("a", Role::Assistant), member("x", Role::Audience)];
        let audience = find_member(&members, "x").unwrap();
        assert!(check_upgrade_admissible(&members, audience, Role::Student, 2).is_ok());
        assert_eq!(
            check_upgrade_admissible(&members, audience, Role::Student, 1),
            Err(RoomError::OverCapacity { capacity: 1 })
        );
    }

    #[test]
    fn test_role_vacancy() {
        let members = vec![member("a", Role::Assistant), member("s", Role::Student)];
        assert!(check_role_vacant(&members, "s", Role::Teacher).is_ok());
        assert!(check_role_vacant(&members, "s", Role::Assistant).is_err());
        assert!(check_role_vacant(&members, "a", Role::Assistant).is_ok());
        assert!(check_role_vacant(&members, "s", Role::Student).is_ok());
    }

    #[test]
    fn test_require_role() {
        let members = vec![member("a", Role::Assistant), member("s", Role::Student)];
        assert!(require_role(&members, "a", STAFF, "kick").is_ok());
        assert!(matches!(
            require_role(&members, "s", STAFF, "kick"),
            Err(RoomError::PermissionDenied(_))
        ));
        assert!(matches!(
            require_role(&members, "ghost", STAFF, "kick"),
            Err(RoomError::PermissionDenied(_))
        ));
    }
}
