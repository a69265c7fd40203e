//! `RoomActor` - per-room actor that serializes every operation on a room.
//!
//! Each `RoomActor`:
//! - Handles one message at a time, so every check-then-act rule (capacity,
//!   single Teacher/Assistant, display ownership) runs without interleaving
//! - Creates its room on the first join and tears it down when the last
//!   member leaves, when an administrator destroys it, or when the room
//!   reaches its maximum lifetime
//! - Stops after teardown; requests still queued are dropped and re-routed
//!   by the controller
//!
//! Role, ticket, display and whiteboard workflows live in the sibling
//! `workflows` and `whiteboards` modules as further `impl RoomActor` blocks.

use super::messages::{
    Identity, JoinRequest, JoinResult, Reply, RoomMessage, RoomStatus, WhiteboardInfo,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::config::Config;
use crate::display::{self, DisplayKind, DisplayPointer};
use crate::errors::RoomError;
use crate::notifications::{Delivery, MemberAction, Notification, Notifier};
use crate::observability::metrics;
use crate::roles::{self, DeviceType, Role};
use crate::services::{CredentialIssuer, MessagingClient, WhiteboardClient};
use crate::store::{MemberRecord, RoomRecord, RoomStore};
use crate::tickets::TicketStore;

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Sender id used for notices the service emits on its own behalf.
pub(crate) const SYSTEM_SENDER: &str = "system";

/// Room rules taken from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomPolicy {
    /// Maximum non-audience members per room.
    pub capacity: usize,
    /// Age at which a room is force-destroyed. `None` disables the limit.
    pub max_lifetime: Option<Duration>,
}

impl RoomPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.max_seats,
            max_lifetime: config.room_max_lifetime(),
        }
    }
}

/// Collaborators shared by every room actor.
#[derive(Clone)]
pub struct RoomServices {
    pub store: Arc<dyn RoomStore>,
    pub messaging: Arc<dyn MessagingClient>,
    pub whiteboards: Arc<dyn WhiteboardClient>,
    pub credentials: Arc<dyn CredentialIssuer>,
    pub tickets: Arc<TicketStore>,
    pub notifier: Notifier,
    pub policy: RoomPolicy,
}

impl RoomServices {
    #[must_use]
    pub fn new(
        store: Arc<dyn RoomStore>,
        messaging: Arc<dyn MessagingClient>,
        whiteboards: Arc<dyn WhiteboardClient>,
        credentials: Arc<dyn CredentialIssuer>,
        tickets: Arc<TicketStore>,
        policy: RoomPolicy,
    ) -> Self {
        Self {
            notifier: Notifier::new(Arc::clone(&messaging)),
            store,
            messaging,
            whiteboards,
            credentials,
            tickets,
            policy,
        }
    }
}

/// Handle to a `RoomActor`.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: String,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Whether the actor has stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> RoomMessage,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RoomError::RoomClosed)?;
        rx.await.map_err(|_| RoomError::RoomClosed)?
    }

    pub async fn join(&self, request: JoinRequest) -> Result<JoinResult, RoomError> {
        self.request(|respond_to| RoomMessage::Join {
            request,
            respond_to,
        })
        .await
    }

    pub async fn leave(&self, identity: Identity) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::Leave {
            identity,
            respond_to,
        })
        .await
    }

    pub async fn kick(&self, actor_id: &str, target_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::Kick {
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn downgrade(
        &self,
        actor_id: &str,
        target_ids: &[String],
    ) -> Result<bool, RoomError> {
        self.request(|respond_to| RoomMessage::Downgrade {
            actor_id: actor_id.to_string(),
            target_ids: target_ids.to_vec(),
            respond_to,
        })
        .await
    }

    pub async fn transfer(&self, actor_id: &str, target_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::Transfer {
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn change_role(
        &self,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::ChangeRole {
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            role,
            respond_to,
        })
        .await
    }

    pub async fn invite_upgrade(
        &self,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<String, RoomError> {
        self.request(|respond_to| RoomMessage::InviteUpgrade {
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            role,
            respond_to,
        })
        .await
    }

    pub async fn approve_upgrade(&self, actor_id: &str, ticket_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::ApproveUpgrade {
            actor_id: actor_id.to_string(),
            ticket_id: ticket_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn reject_upgrade(&self, actor_id: &str, ticket_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::RejectUpgrade {
            actor_id: actor_id.to_string(),
            ticket_id: ticket_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn apply_speech(&self, actor_id: &str) -> Result<String, RoomError> {
        self.request(|respond_to| RoomMessage::ApplySpeech {
            actor_id: actor_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn approve_speech(&self, actor_id: &str, ticket_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::ApproveSpeech {
            actor_id: actor_id.to_string(),
            ticket_id: ticket_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn reject_speech(&self, actor_id: &str, ticket_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::RejectSpeech {
            actor_id: actor_id.to_string(),
            ticket_id: ticket_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn control_device(
        &self,
        actor_id: &str,
        target_id: &str,
        device: DeviceType,
        enable: bool,
    ) -> Result<Option<String>, RoomError> {
        self.request(|respond_to| RoomMessage::ControlDevice {
            actor_id: actor_id.to_string(),
            target_id: target_id.to_string(),
            device,
            enable,
            respond_to,
        })
        .await
    }

    pub async fn approve_device(&self, actor_id: &str, ticket_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::ApproveDevice {
            actor_id: actor_id.to_string(),
            ticket_id: ticket_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn reject_device(&self, actor_id: &str, ticket_id: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::RejectDevice {
            actor_id: actor_id.to_string(),
            ticket_id: ticket_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn sync_device(
        &self,
        actor_id: &str,
        device: DeviceType,
        enabled: bool,
    ) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::SyncDevice {
            actor_id: actor_id.to_string(),
            device,
            enabled,
            respond_to,
        })
        .await
    }

    pub async fn set_display(
        &self,
        actor_id: &str,
        kind: DisplayKind,
        reference: Option<&str>,
    ) -> Result<DisplayPointer, RoomError> {
        self.request(|respond_to| RoomMessage::SetDisplay {
            actor_id: actor_id.to_string(),
            kind,
            reference: reference.map(str::to_string),
            respond_to,
        })
        .await
    }

    pub async fn create_whiteboard(&self, actor_id: &str) -> Result<WhiteboardInfo, RoomError> {
        self.request(|respond_to| RoomMessage::CreateWhiteboard {
            actor_id: actor_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn delete_whiteboard(
        &self,
        actor_id: &str,
        whiteboard_id: &str,
    ) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::DeleteWhiteboard {
            actor_id: actor_id.to_string(),
            whiteboard_id: whiteboard_id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn turn_page(
        &self,
        actor_id: &str,
        whiteboard_id: &str,
        page: u32,
    ) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::TurnPage {
            actor_id: actor_id.to_string(),
            whiteboard_id: whiteboard_id.to_string(),
            page,
            respond_to,
        })
        .await
    }

    pub async fn list_whiteboards(&self) -> Result<Vec<WhiteboardInfo>, RoomError> {
        self.request(|respond_to| RoomMessage::ListWhiteboards { respond_to }).await
    }

    pub async fn get_members(&self) -> Result<Vec<MemberRecord>, RoomError> {
        self.request(|respond_to| RoomMessage::GetMembers { respond_to }).await
    }

    pub async fn get_status(&self) -> Result<RoomStatus, RoomError> {
        self.request(|respond_to| RoomMessage::GetStatus { respond_to }).await
    }

    pub async fn destroy(&self, reason: &str) -> Result<(), RoomError> {
        self.request(|respond_to| RoomMessage::Destroy {
            reason: reason.to_string(),
            respond_to,
        })
        .await
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    pub(super) room_id: String,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    pub(super) services: RoomServices,
    /// Whether the room record exists. The actor stops once this is false
    /// after handling a message.
    live: bool,
    /// When the room reaches its maximum lifetime.
    deadline: Option<Instant>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a room actor. Returns its handle and task join handle.
    pub fn spawn(
        room_id: String,
        cancel_token: CancellationToken,
        services: RoomServices,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            services,
            live: false,
            deadline: None,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, &room_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "classroom.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        self.restore().await;
        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            restored = self.live,
            "RoomActor started"
        );

        loop {
            let deadline = self.deadline;
            let expiry = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "classroom.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                () = expiry => {
                    self.handle_expiry().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.begin();
                            self.handle_message(message).await;
                            self.mailbox.finish();
                            self.metrics.record_handled();
                            if !self.live {
                                debug!(
                                    target: "classroom.actor.room",
                                    room_id = %self.room_id,
                                    "Room no longer exists, stopping actor"
                                );
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "classroom.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.handled(),
            "RoomActor stopped"
        );
    }

    /// Pick up a room that already exists in the store.
    async fn restore(&mut self) {
        match self.services.store.get_room(&self.room_id).await {
            Ok(Some(room)) => {
                self.live = true;
                self.deadline = self.services.policy.max_lifetime.map(|limit| {
                    let age = (Utc::now() - room.created_at).to_std().unwrap_or_default();
                    Instant::now() + limit.saturating_sub(age)
                });
            }
            Ok(None) => {}
            Err(e) => warn!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Failed to load room state"
            ),
        }
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RoomMessage) {
        let started = Instant::now();
        match message {
            RoomMessage::Join {
                request,
                respond_to,
            } => {
                let result = self.handle_join(request).await;
                finish("join", started, result, respond_to);
            }
            RoomMessage::Leave {
                identity,
                respond_to,
            } => {
                let result = self.handle_leave(identity).await;
                finish("leave", started, result, respond_to);
            }
            RoomMessage::Kick {
                actor_id,
                target_id,
                respond_to,
            } => {
                let result = self.handle_kick(&actor_id, &target_id).await;
                finish("kick", started, result, respond_to);
            }
            RoomMessage::Downgrade {
                actor_id,
                target_ids,
                respond_to,
            } => {
                let result = self.handle_downgrade(&actor_id, &target_ids).await;
                finish("downgrade", started, result, respond_to);
            }
            RoomMessage::Transfer {
                actor_id,
                target_id,
                respond_to,
            } => {
                let result = self.handle_transfer(&actor_id, &target_id).await;
                finish("transfer", started, result, respond_to);
            }
            RoomMessage::ChangeRole {
                actor_id,
                target_id,
                role,
                respond_to,
            } => {
                let result = self.handle_change_role(&actor_id, &target_id, role).await;
                finish("change_role", started, result, respond_to);
            }
            RoomMessage::InviteUpgrade {
                actor_id,
                target_id,
                role,
                respond_to,
            } => {
                let result = self.handle_invite_upgrade(&actor_id, &target_id, role).await;
                finish("invite_upgrade", started, result, respond_to);
            }
            RoomMessage::ApproveUpgrade {
                actor_id,
                ticket_id,
                respond_to,
            } => {
                let result = self.handle_approve_upgrade(&actor_id, &ticket_id).await;
                finish("approve_upgrade", started, result, respond_to);
            }
            RoomMessage::RejectUpgrade {
                actor_id,
                ticket_id,
                respond_to,
            } => {
                let result = self.handle_reject_upgrade(&actor_id, &ticket_id).await;
                finish("reject_upgrade", started, result, respond_to);
            }
            RoomMessage::ApplySpeech {
                actor_id,
                respond_to,
            } => {
                let result = self.handle_apply_speech(&actor_id).await;
                finish("apply_speech", started, result, respond_to);
            }
            RoomMessage::ApproveSpeech {
                actor_id,
                ticket_id,
                respond_to,
            } => {
                let result = self.handle_approve_speech(&actor_id, &ticket_id).await;
                finish("approve_speech", started, result, respond_to);
            }
            RoomMessage::RejectSpeech {
                actor_id,
                ticket_id,
                respond_to,
            } => {
                let result = self.handle_reject_speech(&actor_id, &ticket_id).await;
                finish("reject_speech", started, result, respond_to);
            }
            RoomMessage::ControlDevice {
                actor_id,
                target_id,
                device,
                enable,
                respond_to,
            } => {
                let result = self
                    .handle_control_device(&actor_id, &target_id, device, enable)
                    .await;
                finish("control_device", started, result, respond_to);
            }
            RoomMessage::ApproveDevice {
                actor_id,
                ticket_id,
                respond_to,
            } => {
                let result = self.handle_approve_device(&actor_id, &ticket_id).await;
                finish("approve_device", started, result, respond_to);
            }
            RoomMessage::RejectDevice {
                actor_id,
                ticket_id,
                respond_to,
            } => {
                let result = self.handle_reject_device(&actor_id, &ticket_id).await;
                finish("reject_device", started, result, respond_to);
            }
            RoomMessage::SyncDevice {
                actor_id,
                device,
                enabled,
                respond_to,
            } => {
                let result = self.handle_sync_device(&actor_id, device, enabled).await;
                finish("sync_device", started, result, respond_to);
            }
            RoomMessage::SetDisplay {
                actor_id,
                kind,
                reference,
                respond_to,
            } => {
                let result = self
                    .handle_set_display(&actor_id, kind, reference.as_deref())
                    .await;
                finish("set_display", started, result, respond_to);
            }
            RoomMessage::CreateWhiteboard {
                actor_id,
                respond_to,
            } => {
                let result = self.handle_create_whiteboard(&actor_id).await;
                finish("create_whiteboard", started, result, respond_to);
            }
            RoomMessage::DeleteWhiteboard {
                actor_id,
                whiteboard_id,
                respond_to,
            } => {
                let result = self
                    .handle_delete_whiteboard(&actor_id, &whiteboard_id)
                    .await;
                finish("delete_whiteboard", started, result, respond_to);
            }
            RoomMessage::TurnPage {
                actor_id,
                whiteboard_id,
                page,
                respond_to,
            } => {
                let result = self
                    .handle_turn_page(&actor_id, &whiteboard_id, page)
                    .await;
                finish("turn_page", started, result, respond_to);
            }
            RoomMessage::ListWhiteboards { respond_to } => {
                let result = self.handle_list_whiteboards().await;
                finish("list_whiteboards", started, result, respond_to);
            }
            RoomMessage::GetMembers { respond_to } => {
                let result = self.handle_get_members().await;
                finish("get_members", started, result, respond_to);
            }
            RoomMessage::GetStatus { respond_to } => {
                let result = self.get_status().await;
                let _ = respond_to.send(result);
            }
            RoomMessage::Destroy { reason, respond_to } => {
                let result = self.force_destroy(&reason).await;
                finish("destroy", started, result, respond_to);
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    /// The room record, or `RoomNotFound`.
    pub(super) async fn room(&self) -> Result<RoomRecord, RoomError> {
        self.services
            .store
            .get_room(&self.room_id)
            .await?
            .ok_or_else(|| RoomError::RoomNotFound(self.room_id.clone()))
    }

    pub(super) async fn members(&self) -> Result<Vec<MemberRecord>, RoomError> {
        self.services.store.list_members(&self.room_id).await
    }

    /// Commit a new display pointer and announce it.
    pub(super) async fn commit_display(
        &self,
        sender_id: &str,
        pointer: &DisplayPointer,
        delivery: Delivery,
    ) -> Result<(), RoomError> {
        self.services
            .store
            .set_display(&self.room_id, pointer.clone())
            .await?;
        debug!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            display = %pointer,
            "Display changed"
        );
        self.services
            .notifier
            .display_changed(&self.room_id, sender_id, pointer, delivery)
            .await
    }

    /// Re-evaluate the display after `user_id` left holding `role`.
    async fn cascade_departure(
        &self,
        sender_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), RoomError> {
        let room = self.room().await?;
        let remaining = self.members().await?;
        if let Some(next) = display::after_departure(&room.display, user_id, role, &remaining) {
            self.commit_display(sender_id, &next, Delivery::BestEffort).await?;
        }
        Ok(())
    }

    pub(super) async fn broadcast(
        &self,
        sender_id: &str,
        notification: Notification,
        delivery: Delivery,
    ) -> Result<(), RoomError> {
        self.services
            .notifier
            .broadcast(&self.room_id, sender_id, notification, delivery)
            .await
    }

    pub(super) async fn send_to(
        &self,
        sender_id: &str,
        target_id: &str,
        notification: Notification,
        delivery: Delivery,
    ) -> Result<(), RoomError> {
        self.services
            .notifier
            .send_to(&self.room_id, sender_id, target_id, notification, delivery)
            .await
    }

    // ------------------------------------------------------------------
    // Room lifecycle
    // ------------------------------------------------------------------

    /// Create the room if it does not exist. Returns whether it was created.
    ///
    /// A created room gets its messaging group; if that fails the room record
    /// is removed again.
    async fn ensure_room(&mut self, creator_id: &str) -> Result<bool, RoomError> {
        let created = self
            .services
            .store
            .insert_room_if_absent(RoomRecord::new(&self.room_id))
            .await?;
        if !created {
            self.live = true;
            return Ok(false);
        }

        if let Err(e) = self
            .services
            .messaging
            .create_group(&self.room_id, creator_id)
            .await
        {
            warn!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Group creation failed, rolling back room"
            );
            self.services.store.delete_room(&self.room_id).await?;
            return Err(e);
        }

        self.live = true;
        self.deadline = self
            .services
            .policy
            .max_lifetime
            .map(|limit| Instant::now() + limit);
        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            "Room created"
        );
        Ok(true)
    }

    /// Undo a room created by a join that then failed.
    async fn rollback_room(&mut self, creator_id: &str) {
        if let Err(e) = self.services.store.delete_room(&self.room_id).await {
            warn!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Failed to roll back room record"
            );
        }
        if let Err(e) = self
            .services
            .messaging
            .dismiss_group(&self.room_id, creator_id)
            .await
        {
            warn!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Failed to dismiss group during rollback"
            );
        }
        self.live = false;
        self.deadline = None;
    }

    /// Tear the room down when nobody is left.
    async fn teardown_if_empty(&mut self) -> Result<bool, RoomError> {
        if !self.members().await?.is_empty() {
            return Ok(false);
        }
        self.teardown("empty").await?;
        Ok(true)
    }

    /// Delete the room with its members, whiteboards and pending tickets.
    async fn teardown(&mut self, reason: &str) -> Result<(), RoomError> {
        let services = &self.services;
        let whiteboards = services.store.delete_whiteboards(&self.room_id).await?;
        for whiteboard in &whiteboards {
            if let Err(e) = services.whiteboards.destroy(&whiteboard.session_token).await {
                warn!(
                    target: "classroom.actor.room",
                    room_id = %self.room_id,
                    whiteboard_id = %whiteboard.whiteboard_id,
                    error = %e,
                    "Whiteboard destroy failed during teardown"
                );
            }
        }
        let members = services.store.delete_members(&self.room_id).await?;
        let tickets = services.tickets.purge_room(&self.room_id);
        services.store.delete_room(&self.room_id).await?;

        self.live = false;
        self.deadline = None;

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            reason = reason,
            members = members,
            whiteboards = whiteboards.len(),
            tickets = tickets,
            "Room torn down"
        );
        Ok(())
    }

    /// Unconditional teardown. The group is dismissed and members are told
    /// before state is removed; both sends are best-effort.
    async fn force_destroy(&mut self, reason: &str) -> Result<(), RoomError> {
        self.room().await?;

        if let Err(e) = self
            .services
            .messaging
            .dismiss_group(&self.room_id, SYSTEM_SENDER)
            .await
        {
            warn!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Group dismiss failed during forced teardown"
            );
        }
        self.broadcast(
            SYSTEM_SENDER,
            Notification::RoomDismissed {
                reason: reason.to_string(),
            },
            Delivery::BestEffort,
        )
        .await?;

        self.teardown(reason).await
    }

    async fn handle_expiry(&mut self) {
        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            "Room reached maximum lifetime"
        );
        let started = Instant::now();
        let result = self.force_destroy("expired").await;
        record("expire", started, &result);
        if let Err(e) = result {
            warn!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                error = %e,
                "Failed to destroy expired room"
            );
        }
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    async fn handle_join(&mut self, request: JoinRequest) -> Result<JoinResult, RoomError> {
        let user_id = match request.existing {
            Some(identity)
                if identity.user_name == request.user_name
                    && identity.room_id == self.room_id =>
            {
                identity.user_id
            }
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let created = self.ensure_room(&user_id).await?;
        let member = match self
            .admit(&user_id, &request.user_name, request.is_audience, created)
            .await
        {
            Ok(member) => member,
            Err(e) => {
                if created {
                    self.rollback_room(&user_id).await;
                }
                return Err(e);
            }
        };

        let credentials = &self.services.credentials;
        let session_token = credentials
            .issue_session_token(&member.user_id, &member.user_name, &self.room_id)
            .await?;
        let messaging_token = credentials
            .issue_messaging_token(&member.user_id, &member.user_name)
            .await?;

        let room = self.room().await?;
        let members = self.members().await?;
        let whiteboards = self
            .services
            .store
            .list_whiteboards(&self.room_id)
            .await?
            .iter()
            .map(WhiteboardInfo::from)
            .collect();

        Ok(JoinResult {
            user_id: member.user_id,
            user_name: member.user_name,
            role: member.role,
            display: room.display,
            members,
            whiteboards,
            session_token,
            messaging_token,
        })
    }

    /// Add `user_id` to the room, or return their existing record.
    async fn admit(
        &mut self,
        user_id: &str,
        user_name: &str,
        wants_audience: bool,
        created: bool,
    ) -> Result<MemberRecord, RoomError> {
        let members = self.members().await?;
        if let Some(existing) = roles::find_member(&members, user_id) {
            debug!(
                target: "classroom.actor.room",
                room_id = %self.room_id,
                user_id = %user_id,
                role = %existing.role,
                "Member rejoined"
            );
            return Ok(existing.clone());
        }

        let role = roles::assign_join_role(&members, wants_audience);
        if role.occupies_seat() {
            roles::check_capacity(&members, user_id, self.services.policy.capacity)?;
        }

        let member = MemberRecord {
            room_id: self.room_id.clone(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            role,
            camera_enabled: true,
            mic_enabled: true,
            joined_at: Utc::now(),
        };
        self.services
            .store
            .insert_member_if_absent(member.clone())
            .await?;

        // The group creator is already in the group.
        if !created {
            if let Err(e) = self
                .services
                .messaging
                .join_group(&self.room_id, user_id)
                .await
            {
                self.services
                    .store
                    .delete_member(&self.room_id, user_id)
                    .await?;
                return Err(e);
            }
        }

        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            user_id = %user_id,
            role = %role,
            "Member joined"
        );

        self.broadcast(
            user_id,
            Notification::MemberChanged {
                action: MemberAction::Join,
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                role,
                timestamp: member.joined_at.timestamp_millis(),
            },
            Delivery::BestEffort,
        )
        .await?;

        Ok(member)
    }

    async fn handle_leave(&mut self, identity: Identity) -> Result<(), RoomError> {
        if identity.room_id != self.room_id {
            return Err(RoomError::Validation(
                "identity does not belong to this room".to_string(),
            ));
        }
        self.room().await?;
        let members = self.members().await?;
        let member = roles::find_member(&members, &identity.user_id)
            .cloned()
            .ok_or_else(|| RoomError::MemberNotFound(identity.user_id.clone()))?;

        let messaging = &self.services.messaging;
        if members.len() == 1 {
            messaging.dismiss_group(&self.room_id, &member.user_id).await?;
        } else {
            messaging.quit_group(&self.room_id, &member.user_id).await?;
        }

        self.services
            .store
            .delete_member(&self.room_id, &member.user_id)
            .await?;
        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            user_id = %member.user_id,
            "Member left"
        );

        if self.teardown_if_empty().await? {
            return Ok(());
        }

        self.cascade_departure(&member.user_id, &member.user_id, member.role).await?;
        self.broadcast(
            &member.user_id,
            Notification::MemberChanged {
                action: MemberAction::Leave,
                user_id: member.user_id.clone(),
                user_name: member.user_name.clone(),
                role: member.role,
                timestamp: Utc::now().timestamp_millis(),
            },
            Delivery::BestEffort,
        )
        .await
    }

    async fn handle_kick(&mut self, actor_id: &str, target_id: &str) -> Result<(), RoomError> {
        self.room().await?;
        let members = self.members().await?;
        roles::require_role(&members, actor_id, roles::STAFF, "kick")?;
        if actor_id == target_id {
            return Err(RoomError::SelfTarget);
        }
        let target = roles::find_member(&members, target_id)
            .cloned()
            .ok_or_else(|| RoomError::MemberNotFound(target_id.to_string()))?;

        self.services
            .store
            .delete_member(&self.room_id, target_id)
            .await?;
        info!(
            target: "classroom.actor.room",
            room_id = %self.room_id,
            actor_id = %actor_id,
            user_id = %target_id,
            "Member kicked"
        );

        if self.teardown_if_empty().await? {
            return Ok(());
        }
        self.cascade_departure(actor_id, target_id, target.role).await?;

        self.broadcast(
            actor_id,
            Notification::MemberChanged {
                action: MemberAction::Kick,
                user_id: target.user_id.clone(),
                user_name: target.user_name.clone(),
                role: target.role,
                timestamp: Utc::now().timestamp_millis(),
            },
            Delivery::Required,
        )
        .await?;

        self.services
            .messaging
            .quit_group(&self.room_id, target_id)
            .await
    }

    async fn handle_get_members(&self) -> Result<Vec<MemberRecord>, RoomError> {
        self.room().await?;
        self.members().await
    }

    async fn get_status(&self) -> Result<RoomStatus, RoomError> {
        let room = self.room().await?;
        let members = self.members().await?;
        let whiteboards = self.services.store.list_whiteboards(&self.room_id).await?;
        Ok(RoomStatus {
            room_id: self.room_id.clone(),
            member_count: members.len(),
            seated_count: roles::seated_count(&members),
            display: room.display,
            whiteboard_count: whiteboards.len(),
            pending_tickets: self.services.tickets.pending_for_room(&self.room_id),
            mailbox_depth: self.mailbox.depth(),
        })
    }
}

/// Record operation metrics and send the reply.
fn finish<T>(
    operation: &'static str,
    started: Instant,
    result: Result<T, RoomError>,
    respond_to: Reply<T>,
) {
    record(operation, started, &result);
    let _ = respond_to.send(result);
}

fn record<T>(operation: &'static str, started: Instant, result: &Result<T, RoomError>) {
    let status = match result {
        Ok(_) => "success",
        Err(e) => {
            debug!(
                target: "classroom.actor.room",
                operation = operation,
                error = %e,
                "Operation failed"
            );
            e.status_label()
        }
    };
    metrics::record_operation(operation, status, started.elapsed());
}
