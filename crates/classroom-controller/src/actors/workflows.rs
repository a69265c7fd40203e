//! Role changes and ticketed approval flows handled by the room actor.
//!
//! Approve handlers inspect the pending ticket, run every role and capacity
//! check, and only then consume it. A failed check leaves the ticket pending
//! so it can still be rejected or expire. Reject handlers consume directly.

use super::room::RoomActor;
use crate::display::{self, DisplayPointer};
use crate::errors::RoomError;
use crate::notifications::{Delivery, Notification, RoleChange, TicketAction};
use crate::observability::metrics;
use crate::roles::{self, DeviceType, Role};
use crate::store::MemberRecord;
use crate::tickets::{Ticket, TicketKind, TicketOutcome, TicketPayload};
use tracing::{debug, info, warn};

impl RoomActor {
    // ------------------------------------------------------------------
    // Direct role changes
    // ------------------------------------------------------------------

    pub(super) async fn handle_downgrade(
        &mut self,
        actor_id: &str,
        target_ids: &[String],
    ) -> Result<bool, RoomError> {
        let room = self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, roles::STAFF, "downgrade")?;
        if target_ids.is_empty() {
            return Err(RoomError::Validation("no downgrade targets".to_string()));
        }
        if target_ids.iter().any(|t| t == actor_id) {
            return Err(RoomError::SelfTarget);
        }

        let mut changed = Vec::new();
        for target_id in target_ids {
            let Some(member) = roles::find_member(&members, target_id) else {
                debug!(
                    target: "classroom.actor.room",
                    room_id = %self.room_id,
                    user_id = %target_id,
                    "Downgrade target not in room, skipping"
                );
                continue;
            };
            if member.role == Role::Audience {
                continue;
            }
            let mut updated = member.clone();
            updated.role = Role::Audience;
            self.services.store.update_member(&updated).await?;
            changed.push((updated, member.role));
        }

        if changed.is_empty() {
            return Ok(false);
        }

        let after = self.members().await?;
        let mut pointer = room.display;
        let mut pointer_changed = false;
        for (member, old_role) in &changed {
            let next = display::after_role_change(
                &pointer,
                &member.user_id,
                *old_role,
                member.role,
                &after,
            );
            if let Some(next) = next {
                pointer = next;
                pointer_changed = true;
            }
        }
        if pointer_changed {
            self.commit_display(actor_id, &pointer, Delivery::BestEffort).await?;
        }

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            actor_id = %actor_id,
            count = changed.len(),
            "Members downgraded to audience"
        );

        self.broadcast(
            actor_id,
            Notification::RoleChanged {
                op_user_id: actor_id.to_string(),
                users: changed.iter().map(|(m, _)| role_change(m)).collect(),
            },
            Delivery::Required,
        )
        .await?;
        Ok(true)
    }

    pub(super) async fn handle_transfer(
        &mut self,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), RoomError> {
        let room = self.room().await?;
        let members = self.members().await?;
        let actor = roles::require_role(&members, actor_id, &[Role::Assistant], "transfer")?;
        if actor_id == target_id {
            return Err(RoomError::Validation(
                "cannot transfer the assistant role to yourself".to_string(),
            ));
        }
        let target = roles::find_member(&members, target_id)
            .ok_or_else(|| RoomError::MemberNotFound(target_id.to_string()))?;
        if target.role == Role::Audience {
            roles::check_capacity(&members, target_id, self.services.policy.capacity)?;
        }

        let mut outgoing = actor.clone();
        outgoing.role = Role::Student;
        let mut incoming = target.clone();
        let target_old_role = incoming.role;
        incoming.role = Role::Assistant;
        self.services.store.update_member(&outgoing).await?;
        self.services.store.update_member(&incoming).await?;

        let after = self.members().await?;
        let mut pointer = room.display;
        let mut pointer_changed = false;
        for (user_id, old, new) in [
            (actor_id, Role::Assistant, Role::Student),
            (target_id, target_old_role, Role::Assistant),
        ] {
            if let Some(next) = display::after_role_change(&pointer, user_id, old, new, &after) {
                pointer = next;
                pointer_changed = true;
            }
        }
        if pointer_changed {
            self.commit_display(actor_id, &pointer, Delivery::BestEffort).await?;
        }

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            from = %actor_id,
            to = %target_id,
            "Assistant role transferred"
        );

        self.broadcast(
            actor_id,
            Notification::AssistantTransferred {
                op_user_id: actor_id.to_string(),
                to_user_id: target_id.to_string(),
            },
            Delivery::Required,
        )
        .await
    }

    pub(super) async fn handle_change_role(
        &mut self,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, &[Role::Assistant], "change role")?;
        if role != Role::Teacher {
            return Err(RoomError::Validation(
                "only promotion to teacher is supported".to_string(),
            ));
        }
        let target = roles::find_member(&members, target_id)
            .ok_or_else(|| RoomError::MemberNotFound(target_id.to_string()))?;
        if target.role != Role::Student {
            return Err(RoomError::IllegalRoleTransition(format!(
                "only a student can become teacher, target is {}",
                target.role
            )));
        }

        let mut users = Vec::with_capacity(2);
        if let Some(previous) = roles::holder_of(&members, Role::Teacher) {
            let mut demoted = previous.clone();
            demoted.role = Role::Student;
            self.services.store.update_member(&demoted).await?;
            users.push(role_change(&demoted));
        }
        let mut promoted = target.clone();
        promoted.role = Role::Teacher;
        self.services.store.update_member(&promoted).await?;
        users.push(role_change(&promoted));

        let pointer = DisplayPointer::Teacher {
            user_id: target_id.to_string(),
        };
        self.services
            .store
            .set_display(&self.room_id, pointer.clone())
            .await?;

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            user_id = %target_id,
            "Teacher changed"
        );

        self.broadcast(
            actor_id,
            Notification::RoleChanged {
                op_user_id: actor_id.to_string(),
                users,
            },
            Delivery::Required,
        )
        .await?;
        self.services
            .notifier
            .display_changed(&self.room_id, actor_id, &pointer, Delivery::BestEffort)
            .await
    }

    // ------------------------------------------------------------------
    // Ticket helpers
    // ------------------------------------------------------------------

    /// Pending ticket of `kind` in this room, without consuming it.
    fn inspect_ticket(
        &self,
        ticket_id: &str,
        kind: TicketKind,
        addressee: Option<&str>,
    ) -> Result<Ticket, RoomError> {
        self.services
            .tickets
            .peek(ticket_id)
            .filter(|t| self.ticket_matches(t, kind, addressee))
            .ok_or(RoomError::TicketNotFound)
    }

    /// Consume a ticket of `kind` in this room.
    fn claim_ticket(
        &self,
        ticket_id: &str,
        kind: TicketKind,
        addressee: Option<&str>,
    ) -> Result<Ticket, RoomError> {
        self.services
            .tickets
            .consume_if(ticket_id, |t| self.ticket_matches(t, kind, addressee))
    }

    fn ticket_matches(&self, ticket: &Ticket, kind: TicketKind, addressee: Option<&str>) -> bool {
        ticket.room_id == self.room_id
            && ticket.payload.kind() == kind
            && addressee.map_or(true, |a| ticket.payload.addressee() == a)
    }

    /// Issue a ticket and deliver its invitation. The ticket is revoked if
    /// the invitation cannot be delivered.
    async fn issue_ticket(
        &self,
        sender_id: &str,
        payload: TicketPayload,
        invitation: impl FnOnce(&str) -> Notification,
    ) -> Result<String, RoomError> {
        let addressee = payload.addressee().to_string();
        let ticket_id = self.services.tickets.create(&self.room_id, payload)?;
        let notice = invitation(&ticket_id);
        if let Err(e) = self
            .send_to(sender_id, &addressee, notice, Delivery::Required)
            .await
        {
            self.services.tickets.revoke(&ticket_id);
            warn!(
                target: "classroom.tickets",
                room_id = %self.room_id,
                "Invitation undeliverable, ticket revoked"
            );
            return Err(e);
        }
        Ok(ticket_id)
    }

    // ------------------------------------------------------------------
    // Role upgrade
    // ------------------------------------------------------------------

    pub(super) async fn handle_invite_upgrade(
        &mut self,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<String, RoomError> {
        self.room().await?;
        let members = self.members().await?;
        let actor = roles::require_role(&members, actor_id, &[Role::Assistant], "invite upgrade")?;
        if actor_id == target_id {
            return Err(RoomError::SelfTarget);
        }
        if role == Role::Audience {
            return Err(RoomError::Validation(
                "upgrade must request a seated role".to_string(),
            ));
        }
        let target = roles::find_member(&members, target_id)
            .ok_or_else(|| RoomError::MemberNotFound(target_id.to_string()))?;
        roles::check_upgrade_admissible(&members, target, role, self.services.policy.capacity)?;
        roles::check_role_vacant(&members, target_id, role)?;

        let op_user_name = actor.user_name.clone();
        self.issue_ticket(
            actor_id,
            TicketPayload::RoleUpgrade {
                inviter_id: actor_id.to_string(),
                target_id: target_id.to_string(),
                role,
            },
            |ticket| Notification::UpgradeRole {
                action: TicketAction::Invite,
                ticket: Some(ticket.to_string()),
                op_user_id: actor_id.to_string(),
                op_user_name,
                role,
            },
        )
        .await
    }

    pub(super) async fn handle_approve_upgrade(
        &mut self,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let pending = self.inspect_ticket(ticket_id, TicketKind::RoleUpgrade, Some(actor_id))?;
        let TicketPayload::RoleUpgrade { role, .. } = pending.payload else {
            return Err(RoomError::TicketNotFound);
        };

        let members = self.members().await?;
        let target = roles::find_member(&members, actor_id)
            .ok_or_else(|| RoomError::MemberNotFound(actor_id.to_string()))?;
        roles::check_upgrade_admissible(&members, target, role, self.services.policy.capacity)?;
        roles::check_role_vacant(&members, actor_id, role)?;

        let ticket = self.claim_ticket(ticket_id, TicketKind::RoleUpgrade, Some(actor_id))?;
        metrics::record_ticket_resolved(
            TicketKind::RoleUpgrade.as_str(),
            TicketOutcome::Approved.as_str(),
        );

        let old_role = target.role;
        let mut upgraded = target.clone();
        upgraded.role = role;
        self.services.store.update_member(&upgraded).await?;

        let room = self.room().await?;
        let after = self.members().await?;
        let next = display::after_role_change(&room.display, actor_id, old_role, role, &after);
        if let Some(next) = next {
            self.commit_display(actor_id, &next, Delivery::BestEffort).await?;
        }

        info!(
            target: "classroom.tickets",
            room_id = %self.room_id,
            user_id = %actor_id,
            role = %role,
            "Role upgrade approved"
        );

        let inviter_id = match &ticket.payload {
            TicketPayload::RoleUpgrade { inviter_id, .. } => inviter_id.clone(),
            _ => actor_id.to_string(),
        };
        let op_user_name = self.user_name(actor_id).await?;
        self.send_to(
            actor_id,
            &inviter_id,
            Notification::UpgradeRole {
                action: TicketAction::Approve,
                ticket: None,
                op_user_id: actor_id.to_string(),
                op_user_name,
                role,
            },
            Delivery::Required,
        )
        .await?;

        self.broadcast(
            actor_id,
            Notification::RoleChanged {
                op_user_id: inviter_id,
                users: vec![role_change(&upgraded)],
            },
            Delivery::Required,
        )
        .await
    }

    pub(super) async fn handle_reject_upgrade(
        &mut self,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let ticket = self.claim_ticket(ticket_id, TicketKind::RoleUpgrade, Some(actor_id))?;
        metrics::record_ticket_resolved(
            TicketKind::RoleUpgrade.as_str(),
            TicketOutcome::Rejected.as_str(),
        );
        let TicketPayload::RoleUpgrade {
            inviter_id, role, ..
        } = ticket.payload
        else {
            return Err(RoomError::TicketNotFound);
        };

        let op_user_name = self.user_name(actor_id).await?;
        self.send_to(
            actor_id,
            &inviter_id,
            Notification::UpgradeRole {
                action: TicketAction::Reject,
                ticket: None,
                op_user_id: actor_id.to_string(),
                op_user_name,
                role,
            },
            Delivery::Required,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Speech requests
    // ------------------------------------------------------------------

    pub(super) async fn handle_apply_speech(
        &mut self,
        actor_id: &str,
    ) -> Result<String, RoomError> {
        self.room().await?;
        let members = self.members().await?;
        let applicant = roles::require_role(&members, actor_id, &[Role::Audience], "apply speech")?;
        let assistant = roles::holder_of(&members, Role::Assistant)
            .ok_or(RoomError::AssistantNotFound)?;

        let req_user_name = applicant.user_name.clone();
        self.issue_ticket(
            actor_id,
            TicketPayload::SpeechRequest {
                applicant_id: actor_id.to_string(),
                assistant_id: assistant.user_id.clone(),
            },
            |ticket| Notification::SpeechRequested {
                ticket: ticket.to_string(),
                req_user_id: actor_id.to_string(),
                req_user_name,
            },
        )
        .await
    }

    pub(super) async fn handle_approve_speech(
        &mut self,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let members = self.members().await?;
        let assistant =
            roles::require_role(&members, actor_id, &[Role::Assistant], "approve speech")?;
        let pending = self.inspect_ticket(ticket_id, TicketKind::SpeechRequest, None)?;
        let TicketPayload::SpeechRequest { applicant_id, .. } = pending.payload else {
            return Err(RoomError::TicketNotFound);
        };
        let applicant = roles::find_member(&members, &applicant_id)
            .ok_or_else(|| RoomError::MemberNotFound(applicant_id.clone()))?;
        roles::check_capacity(&members, &applicant_id, self.services.policy.capacity)?;

        self.claim_ticket(ticket_id, TicketKind::SpeechRequest, None)?;
        metrics::record_ticket_resolved(
            TicketKind::SpeechRequest.as_str(),
            TicketOutcome::Approved.as_str(),
        );

        let mut promoted = applicant.clone();
        if promoted.role == Role::Audience {
            promoted.role = Role::Student;
            self.services.store.update_member(&promoted).await?;
        }

        info!(
            target: "classroom.tickets",
            room_id = %self.room_id,
            user_id = %applicant_id,
            "Speech request approved"
        );

        self.send_to(
            actor_id,
            &applicant_id,
            Notification::SpeechResult {
                action: TicketAction::Approve,
                op_user_id: actor_id.to_string(),
                op_user_name: assistant.user_name.clone(),
                req_user_id: applicant_id.clone(),
                req_user_name: promoted.user_name.clone(),
                role: promoted.role,
            },
            Delivery::Required,
        )
        .await?;
        self.broadcast(
            actor_id,
            Notification::RoleChanged {
                op_user_id: actor_id.to_string(),
                users: vec![role_change(&promoted)],
            },
            Delivery::Required,
        )
        .await
    }

    pub(super) async fn handle_reject_speech(
        &mut self,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let members = self.members().await?;
        let assistant =
            roles::require_role(&members, actor_id, &[Role::Assistant], "reject speech")?;
        let ticket = self.claim_ticket(ticket_id, TicketKind::SpeechRequest, None)?;
        metrics::record_ticket_resolved(
            TicketKind::SpeechRequest.as_str(),
            TicketOutcome::Rejected.as_str(),
        );
        let TicketPayload::SpeechRequest { applicant_id, .. } = ticket.payload else {
            return Err(RoomError::TicketNotFound);
        };

        let (req_user_name, role) = roles::find_member(&members, &applicant_id)
            .map_or((String::new(), Role::Audience), |m| {
                (m.user_name.clone(), m.role)
            });
        self.send_to(
            actor_id,
            &applicant_id,
            Notification::SpeechResult {
                action: TicketAction::Reject,
                op_user_id: actor_id.to_string(),
                op_user_name: assistant.user_name.clone(),
                req_user_id: applicant_id.clone(),
                req_user_name,
                role,
            },
            Delivery::Required,
        )
        .await
    }

    // ------------------------------------------------------------------
    // Device control
    // ------------------------------------------------------------------

    pub(super) async fn handle_control_device(
        &mut self,
        actor_id: &str,
        target_id: &str,
        device: DeviceType,
        enable: bool,
    ) -> Result<Option<String>, RoomError> {
        self.room().await?;
        let members = self.members().await?;
        let actor =
            roles::require_role(&members, actor_id, &[Role::Assistant], "control device")?;
        let target = roles::find_member(&members, target_id)
            .ok_or_else(|| RoomError::MemberNotFound(target_id.to_string()))?;

        if !enable {
            let mut updated = target.clone();
            updated.set_device(device, false);
            self.services.store.update_member(&updated).await?;
            debug!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                user_id = %target_id,
                device = device.as_str(),
                "Device disabled by assistant"
            );
            self.device_state_changed(actor_id, &updated, device).await?;
            return Ok(None);
        }

        let op_user_name = actor.user_name.clone();
        let ticket_id = self
            .issue_ticket(
                actor_id,
                TicketPayload::DeviceControl {
                    requester_id: actor_id.to_string(),
                    target_id: target_id.to_string(),
                    device,
                    enable,
                },
                |ticket| Notification::DeviceControl {
                    action: TicketAction::Invite,
                    ticket: Some(ticket.to_string()),
                    device,
                    enable,
                    op_user_id: actor_id.to_string(),
                    op_user_name,
                },
            )
            .await?;
        Ok(Some(ticket_id))
    }

    pub(super) async fn handle_approve_device(
        &mut self,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        self.room().await?;
        self.inspect_ticket(ticket_id, TicketKind::DeviceControl, Some(actor_id))?;
        let member = self
            .services
            .store
            .get_member(&self.room_id, actor_id)
            .await?
            .ok_or_else(|| RoomError::MemberNotFound(actor_id.to_string()))?;

        let ticket = self.claim_ticket(ticket_id, TicketKind::DeviceControl, Some(actor_id))?;
        metrics::record_ticket_resolved(
            TicketKind::DeviceControl.as_str(),
            TicketOutcome::Approved.as_str(),
        );
        let TicketPayload::DeviceControl {
            requester_id,
            device,
            enable,
            ..
        } = ticket.payload
        else {
            return Err(RoomError::TicketNotFound);
        };

        let mut updated = member;
        updated.set_device(device, enable);
        self.services.store.update_member(&updated).await?;

        self.send_to(
            actor_id,
            &requester_id,
            Notification::DeviceControl {
                action: TicketAction::Approve,
                ticket: None,
                device,
                enable,
                op_user_id: actor_id.to_string(),
                op_user_name: updated.user_name.clone(),
            },
            Delivery::Required,
        )
        .await?;
        self.device_state_changed(actor_id, &updated, device).await
    }

    pub(super) async fn handle_reject_device(
        &mut self,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let ticket = self.claim_ticket(ticket_id, TicketKind::DeviceControl, Some(actor_id))?;
        metrics::record_ticket_resolved(
            TicketKind::DeviceControl.as_str(),
            TicketOutcome::Rejected.as_str(),
        );
        let TicketPayload::DeviceControl {
            requester_id,
            device,
            enable,
            ..
        } = ticket.payload
        else {
            return Err(RoomError::TicketNotFound);
        };

        let op_user_name = self.user_name(actor_id).await?;
        self.send_to(
            actor_id,
            &requester_id,
            Notification::DeviceControl {
                action: TicketAction::Reject,
                ticket: None,
                device,
                enable,
                op_user_id: actor_id.to_string(),
                op_user_name,
            },
            Delivery::Required,
        )
        .await
    }

    pub(super) async fn handle_sync_device(
        &mut self,
        actor_id: &str,
        device: DeviceType,
        enabled: bool,
    ) -> Result<(), RoomError> {
        self.room().await?;
        let members = self.members().await?;
        let member = roles::require_role(&members, actor_id, roles::SEATED, "sync device")?;
        let mut updated = member.clone();
        updated.set_device(device, enabled);
        self.services.store.update_member(&updated).await?;
        self.device_state_changed(actor_id, &updated, device).await
    }

    async fn device_state_changed(
        &self,
        sender_id: &str,
        member: &MemberRecord,
        device: DeviceType,
    ) -> Result<(), RoomError> {
        self.broadcast(
            sender_id,
            Notification::DeviceStateChanged {
                user_id: member.user_id.clone(),
                device,
                enabled: member.device_enabled(device),
            },
            Delivery::BestEffort,
        )
        .await
    }

    /// Name of a member, or empty if they already left.
    async fn user_name(&self, user_id: &str) -> Result<String, RoomError> {
        Ok(self
            .services
            .store
            .get_member(&self.room_id, user_id)
            .await?
            .map(|m| m.user_name)
            .unwrap_or_default())
    }
}

fn role_change(member: &MemberRecord) -> RoleChange {
    RoleChange {
        user_id: member.user_id.clone(),
        user_name: member.user_name.clone(),
        role: member.role,
    }
}
