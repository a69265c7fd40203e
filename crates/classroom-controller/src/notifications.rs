//! Outbound room events.
//!
//! Every state transition the room actor commits is announced through a
//! [`Notifier`]. Each send is either [`Delivery::Required`], whose failure is
//! returned to the caller as an upstream error, or [`Delivery::BestEffort`],
//! whose failure is logged and counted but not returned.

use crate::display::DisplayPointer;
use crate::errors::RoomError;
use crate::observability::metrics;
use crate::roles::{DeviceType, Role};
use crate::services::MessagingClient;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberAction {
    Join,
    Leave,
    Kick,
}

/// Step of a ticketed flow a notice reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    Invite,
    Approve,
    Reject,
}

/// One member's new role inside a role-changed broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChange {
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
}

/// Event payload sent to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    MemberChanged {
        action: MemberAction,
        user_id: String,
        user_name: String,
        role: Role,
        timestamp: i64,
    },
    RoleChanged {
        op_user_id: String,
        users: Vec<RoleChange>,
    },
    DisplayChanged {
        display: DisplayPointer,
    },
    DeviceStateChanged {
        user_id: String,
        device: DeviceType,
        enabled: bool,
    },
    DeviceControl {
        action: TicketAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket: Option<String>,
        device: DeviceType,
        enable: bool,
        op_user_id: String,
        op_user_name: String,
    },
    SpeechRequested {
        ticket: String,
        req_user_id: String,
        req_user_name: String,
    },
    SpeechResult {
        action: TicketAction,
        op_user_id: String,
        op_user_name: String,
        req_user_id: String,
        req_user_name: String,
        role: Role,
    },
    UpgradeRole {
        action: TicketAction,
        #[serde(skip_serializing_if = "Option::is_none")]
        ticket: Option<String>,
        op_user_id: String,
        op_user_name: String,
        role: Role,
    },
    AssistantTransferred {
        op_user_id: String,
        to_user_id: String,
    },
    WhiteboardCreated {
        whiteboard_id: String,
        name: String,
    },
    WhiteboardDeleted {
        whiteboard_id: String,
    },
    PageTurned {
        whiteboard_id: String,
        user_id: String,
        page: u32,
    },
    RoomDismissed {
        reason: String,
    },
}

impl Notification {
    /// Bounded event name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Notification::MemberChanged { .. } => "member_changed",
            Notification::RoleChanged { .. } => "role_changed",
            Notification::DisplayChanged { .. } => "display_changed",
            Notification::DeviceStateChanged { .. } => "device_state_changed",
            Notification::DeviceControl { .. } => "device_control",
            Notification::SpeechRequested { .. } => "speech_requested",
            Notification::SpeechResult { .. } => "speech_result",
            Notification::UpgradeRole { .. } => "upgrade_role",
            Notification::AssistantTransferred { .. } => "assistant_transferred",
            Notification::WhiteboardCreated { .. } => "whiteboard_created",
            Notification::WhiteboardDeleted { .. } => "whiteboard_deleted",
            Notification::PageTurned { .. } => "page_turned",
            Notification::RoomDismissed { .. } => "room_dismissed",
        }
    }
}

/// A notification addressed to a room or to one member of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub room_id: String,
    pub sender_id: String,
    /// `None` broadcasts to the whole room.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    pub notification: Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Failure aborts the operation with the collaborator's error.
    Required,
    /// Failure is logged and ignored.
    BestEffort,
}

impl Delivery {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Delivery::Required => "required",
            Delivery::BestEffort => "best_effort",
        }
    }
}

/// Sends [`Notification`]s through the messaging collaborator.
#[derive(Clone)]
pub struct Notifier {
    messaging: Arc<dyn MessagingClient>,
}

impl Notifier {
    #[must_use]
    pub fn new(messaging: Arc<dyn MessagingClient>) -> Self {
        Self { messaging }
    }

    /// Send to every member of `room_id`.
    ///
    /// # Errors
    ///
    /// Returns the messaging error for a failed [`Delivery::Required`] send.
    pub async fn broadcast(
        &self,
        room_id: &str,
        sender_id: &str,
        notification: Notification,
        delivery: Delivery,
    ) -> Result<(), RoomError> {
        self.deliver(
            Envelope {
                room_id: room_id.to_string(),
                sender_id: sender_id.to_string(),
                target_user_id: None,
                notification,
            },
            delivery,
        )
        .await
    }

    /// Send to one member of `room_id`.
    ///
    /// # Errors
    ///
    /// Returns the messaging error for a failed [`Delivery::Required`] send.
    pub async fn send_to(
        &self,
        room_id: &str,
        sender_id: &str,
        target_user_id: &str,
        notification: Notification,
        delivery: Delivery,
    ) -> Result<(), RoomError> {
        self.deliver(
            Envelope {
                room_id: room_id.to_string(),
                sender_id: sender_id.to_string(),
                target_user_id: Some(target_user_id.to_string()),
                notification,
            },
            delivery,
        )
        .await
    }

    /// Announce a new display pointer to the room.
    ///
    /// # Errors
    ///
    /// Returns the messaging error for a failed [`Delivery::Required`] send.
    pub async fn display_changed(
        &self,
        room_id: &str,
        sender_id: &str,
        display: &DisplayPointer,
        delivery: Delivery,
    ) -> Result<(), RoomError> {
        self.broadcast(
            room_id,
            sender_id,
            Notification::DisplayChanged {
                display: display.clone(),
            },
            delivery,
        )
        .await
    }

    async fn deliver(&self, envelope: Envelope, delivery: Delivery) -> Result<(), RoomError> {
        let event = envelope.notification.name();
        match self.messaging.publish(&envelope).await {
            Ok(()) => {
                debug!(
                    target: "classroom.notify",
                    room_id = %envelope.room_id,
                    event = event,
                    directed = envelope.target_user_id.is_some(),
                    "Notification published"
                );
                Ok(())
            }
            Err(e) => {
                metrics::record_notification_failed(delivery.as_str());
                warn!(
                    target: "classroom.notify",
                    room_id = %envelope.room_id,
                    event = event,
                    delivery = delivery.as_str(),
                    error = %e,
                    "Notification publish failed"
                );
                match delivery {
                    Delivery::Required => Err(e),
                    Delivery::BestEffort => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_tagged_json() {
        let json = serde_json::to_value(Notification::RoleChanged {
            op_user_id: "a".to_string(),
            users: vec![RoleChange {
                user_id: "s".to_string(),
                user_name: "Sam".to_string(),
                role: Role::Student,
            }],
        })
        .unwrap();

        assert_eq!(json["type"], "role_changed");
        assert_eq!(json["users"][0]["role"], 3);
    }

    #[test]
    fn test_display_changed_uses_wire_string() {
        let json = serde_json::to_value(Notification::DisplayChanged {
            display: DisplayPointer::Teacher {
                user_id: "t".to_string(),
            },
        })
        .unwrap();
        assert_eq!(json["type"], "display_changed");
        assert_eq!(json["display"], "display://type=1?userId=t?uri=");
    }

    #[test]
    fn test_envelope_omits_missing_target() {
        let envelope = Envelope {
            room_id: "r".to_string(),
            sender_id: "a".to_string(),
            target_user_id: None,
            notification: Notification::RoomDismissed {
                reason: "expired".to_string(),
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("target_user_id").is_none());
        assert_eq!(json["notification"]["type"], "room_dismissed");
    }

    #[test]
    fn test_member_action_names() {
        let json = serde_json::to_value(Notification::MemberChanged {
            action: MemberAction::Kick,
            user_id: "s".to_string(),
            user_name: "Sam".to_string(),
            role: Role::Student,
            timestamp: 0,
        })
        .unwrap();
        assert_eq!(json["action"], "kick");
        assert_eq!(json["type"], "member_changed");
    }
}
