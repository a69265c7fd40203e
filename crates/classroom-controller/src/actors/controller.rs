//! `RoomControllerActor` - singleton router and supervisor for room actors.
//!
//! The `RoomControllerActor` is the top-level actor:
//!
//! - Singleton per process
//! - Spawns one `RoomActor` per live room and hands out its handle
//! - Reaps room actors that stopped (room torn down, or panicked)
//! - Owns the root `CancellationToken` for graceful shutdown
//!
//! [`RoomControllerHandle`] is the public operation surface. Each call is
//! routed to the room's actor; a request that reaches an actor which has just
//! torn its room down comes back as `RoomClosed` and is routed again.

use super::messages::{
    ControllerMessage, ControllerStatus, Identity, JoinRequest, JoinResult, Reply, RoomStatus,
    WhiteboardInfo,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle, RoomServices};
use crate::display::{DisplayKind, DisplayPointer};
use crate::errors::RoomError;
use crate::roles::{DeviceType, Role};
use crate::store::MemberRecord;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// How often finished room actors are reaped when the mailbox is idle.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// How long shutdown waits for each room actor.
const ROOM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Routing attempts before a request gives up on a closing room.
const ROUTE_ATTEMPTS: usize = 3;

/// Handle to the `RoomControllerActor`.
#[derive(Clone)]
pub struct RoomControllerHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
}

impl RoomControllerHandle {
    /// Create a new `RoomControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(instance_id: String, services: RoomServices, metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomControllerActor::new(
            instance_id,
            receiver,
            cancel_token.clone(),
            services,
            Arc::clone(&metrics),
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
            metrics,
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ControllerMessage,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;
        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))?
    }

    /// Resolve the actor for `room_id`.
    async fn route(&self, room_id: &str, create: bool) -> Result<RoomActorHandle, RoomError> {
        self.call(|respond_to| ControllerMessage::Route {
            room_id: room_id.to_string(),
            create,
            respond_to,
        })
        .await
    }

    /// Run `op` against the room's actor, re-routing if the actor closes
    /// underneath the request.
    async fn with_room<T, F, Fut>(&self, room_id: &str, create: bool, op: F) -> Result<T, RoomError>
    where
        F: Fn(RoomActorHandle) -> Fut,
        Fut: Future<Output = Result<T, RoomError>>,
    {
        validate_id("room id", room_id)?;
        for attempt in 1..=ROUTE_ATTEMPTS {
            let room = self.route(room_id, create).await?;
            match op(room).await {
                Err(RoomError::RoomClosed) => {
                    self.metrics.record_reroute();
                    debug!(
                        target: "classroom.actor.controller",
                        room_id = %room_id,
                        attempt = attempt,
                        "Room actor closed during request, re-routing"
                    );
                }
                other => return other,
            }
        }
        Err(RoomError::RoomClosed)
    }

    /// Join a room, creating it if needed.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty name or room id, `OverCapacity` when no seat
    /// is free, or the collaborator's error.
    pub async fn join(&self, request: JoinRequest) -> Result<JoinResult, RoomError> {
        validate_id("user name", &request.user_name)?;
        let request = &request;
        self.with_room(&request.room_id, true, |room| async move {
            room.join(request.clone()).await
        })
        .await
    }

    pub async fn leave(&self, identity: Identity, room_id: &str) -> Result<(), RoomError> {
        validate_id("user id", &identity.user_id)?;
        let identity = &identity;
        self.with_room(room_id, false, |room| async move {
            room.leave(identity.clone()).await
        })
        .await
    }

    pub async fn kick(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("target id", target_id)?;
        self.with_room(room_id, false, |room| async move {
            room.kick(actor_id, target_id).await
        })
        .await
    }

    /// Downgrade every listed member to Audience. Returns whether any role
    /// changed.
    pub async fn downgrade(
        &self,
        room_id: &str,
        actor_id: &str,
        target_ids: &[String],
    ) -> Result<bool, RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.downgrade(actor_id, target_ids).await
        })
        .await
    }

    pub async fn transfer(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("target id", target_id)?;
        self.with_room(room_id, false, |room| async move {
            room.transfer(actor_id, target_id).await
        })
        .await
    }

    pub async fn change_role(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<(), RoomError> {
        validate_id("target id", target_id)?;
        self.with_room(room_id, false, |room| async move {
            room.change_role(actor_id, target_id, role).await
        })
        .await
    }

    /// Invite a member to a higher role. Returns the ticket id.
    pub async fn invite_upgrade(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
        role: Role,
    ) -> Result<String, RoomError> {
        validate_id("target id", target_id)?;
        self.with_room(room_id, false, |room| async move {
            room.invite_upgrade(actor_id, target_id, role).await
        })
        .await
    }

    pub async fn approve_upgrade(
        &self,
        room_id: &str,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("ticket id", ticket_id)?;
        self.with_room(room_id, false, |room| async move {
            room.approve_upgrade(actor_id, ticket_id).await
        })
        .await
    }

    pub async fn reject_upgrade(
        &self,
        room_id: &str,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("ticket id", ticket_id)?;
        self.with_room(room_id, false, |room| async move {
            room.reject_upgrade(actor_id, ticket_id).await
        })
        .await
    }

    /// Ask the Assistant for a seat. Returns the ticket id.
    pub async fn apply_speech(&self, room_id: &str, actor_id: &str) -> Result<String, RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.apply_speech(actor_id).await
        })
        .await
    }

    pub async fn approve_speech(
        &self,
        room_id: &str,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("ticket id", ticket_id)?;
        self.with_room(room_id, false, |room| async move {
            room.approve_speech(actor_id, ticket_id).await
        })
        .await
    }

    pub async fn reject_speech(
        &self,
        room_id: &str,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("ticket id", ticket_id)?;
        self.with_room(room_id, false, |room| async move {
            room.reject_speech(actor_id, ticket_id).await
        })
        .await
    }

    /// Switch a member's device. Enabling asks the owner and returns the
    /// ticket id; disabling applies immediately and returns `None`.
    pub async fn control_device(
        &self,
        room_id: &str,
        actor_id: &str,
        target_id: &str,
        device: DeviceType,
        enable: bool,
    ) -> Result<Option<String>, RoomError> {
        validate_id("target id", target_id)?;
        self.with_room(room_id, false, |room| async move {
            room.control_device(actor_id, target_id, device, enable).await
        })
        .await
    }

    pub async fn approve_device(
        &self,
        room_id: &str,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("ticket id", ticket_id)?;
        self.with_room(room_id, false, |room| async move {
            room.approve_device(actor_id, ticket_id).await
        })
        .await
    }

    pub async fn reject_device(
        &self,
        room_id: &str,
        actor_id: &str,
        ticket_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("ticket id", ticket_id)?;
        self.with_room(room_id, false, |room| async move {
            room.reject_device(actor_id, ticket_id).await
        })
        .await
    }

    /// Report the caller's own device state.
    pub async fn sync_device(
        &self,
        room_id: &str,
        actor_id: &str,
        device: DeviceType,
        enabled: bool,
    ) -> Result<(), RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.sync_device(actor_id, device, enabled).await
        })
        .await
    }

    pub async fn set_display(
        &self,
        room_id: &str,
        actor_id: &str,
        kind: DisplayKind,
        reference: Option<&str>,
    ) -> Result<DisplayPointer, RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.set_display(actor_id, kind, reference).await
        })
        .await
    }

    pub async fn create_whiteboard(
        &self,
        room_id: &str,
        actor_id: &str,
    ) -> Result<WhiteboardInfo, RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.create_whiteboard(actor_id).await
        })
        .await
    }

    pub async fn delete_whiteboard(
        &self,
        room_id: &str,
        actor_id: &str,
        whiteboard_id: &str,
    ) -> Result<(), RoomError> {
        validate_id("whiteboard id", whiteboard_id)?;
        self.with_room(room_id, false, |room| async move {
            room.delete_whiteboard(actor_id, whiteboard_id).await
        })
        .await
    }

    pub async fn turn_page(
        &self,
        room_id: &str,
        actor_id: &str,
        whiteboard_id: &str,
        page: u32,
    ) -> Result<(), RoomError> {
        validate_id("whiteboard id", whiteboard_id)?;
        self.with_room(room_id, false, |room| async move {
            room.turn_page(actor_id, whiteboard_id, page).await
        })
        .await
    }

    pub async fn list_whiteboards(&self, room_id: &str) -> Result<Vec<WhiteboardInfo>, RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.list_whiteboards().await
        })
        .await
    }

    pub async fn get_members(&self, room_id: &str) -> Result<Vec<MemberRecord>, RoomError> {
        self.with_room(room_id, false, |room| async move { room.get_members().await }).await
    }

    pub async fn room_status(&self, room_id: &str) -> Result<RoomStatus, RoomError> {
        self.with_room(room_id, false, |room| async move { room.get_status().await }).await
    }

    /// Administrative teardown of a room regardless of its members.
    pub async fn destroy_room(&self, room_id: &str, reason: &str) -> Result<(), RoomError> {
        self.with_room(room_id, false, |room| async move {
            room.destroy(reason).await
        })
        .await
    }

    /// Get the current controller status.
    pub async fn get_status(&self) -> Result<ControllerStatus, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RoomError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RoomError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.call(|respond_to| ControllerMessage::Shutdown { respond_to }).await
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Child token for tasks that should stop with the controller.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

fn validate_id(field: &str, value: &str) -> Result<(), RoomError> {
    if value.trim().is_empty() {
        return Err(RoomError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Internal state for a managed room.
struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
}

/// The `RoomControllerActor` implementation.
pub struct RoomControllerActor {
    instance_id: String,
    receiver: mpsc::Receiver<ControllerMessage>,
    cancel_token: CancellationToken,
    rooms: HashMap<String, ManagedRoom>,
    accepting_new: bool,
    services: RoomServices,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomControllerActor {
    fn new(
        instance_id: String,
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        services: RoomServices,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Controller, &instance_id);

        Self {
            instance_id,
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            accepting_new: true,
            services,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "classroom.actor.controller",
        fields(instance_id = %self.instance_id)
    )]
    async fn run(mut self) {
        info!(
            target: "classroom.actor.controller",
            instance_id = %self.instance_id,
            "RoomControllerActor started"
        );

        let mut health_check = tokio::time::interval(HEALTH_CHECK_INTERVAL);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "classroom.actor.controller",
                        instance_id = %self.instance_id,
                        "RoomControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                _ = health_check.tick() => {
                    self.check_room_health().await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.begin();
                            self.handle_message(message).await;
                            self.mailbox.finish();
                            self.metrics.record_handled();
                        }
                        None => {
                            info!(
                                target: "classroom.actor.controller",
                                instance_id = %self.instance_id,
                                "RoomControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "classroom.actor.controller",
            instance_id = %self.instance_id,
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.handled(),
            "RoomControllerActor stopped"
        );
    }

    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Route {
                room_id,
                create,
                respond_to,
            } => {
                let result = self.route(room_id, create).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown { respond_to } => {
                info!(
                    target: "classroom.actor.controller",
                    instance_id = %self.instance_id,
                    room_count = self.rooms.len(),
                    "Initiating graceful shutdown"
                );
                self.accepting_new = false;
                self.cancel_token.cancel();
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    /// Return the live actor for `room_id`, spawning one if needed.
    async fn route(&mut self, room_id: String, create: bool) -> Result<RoomActorHandle, RoomError> {
        if let Some(managed) = self.rooms.get(&room_id) {
            if !managed.handle.is_closed() {
                return Ok(managed.handle.clone());
            }
            if let Some(stale) = self.rooms.remove(&room_id) {
                self.reap(&room_id, stale).await;
            }
        }

        if !self.accepting_new {
            return Err(RoomError::Internal("controller is shutting down".to_string()));
        }
        if !create && self.services.store.get_room(&room_id).await?.is_none() {
            return Err(RoomError::RoomNotFound(room_id));
        }

        let (handle, task_handle) = RoomActor::spawn(
            room_id.clone(),
            self.cancel_token.child_token(),
            self.services.clone(),
            Arc::clone(&self.metrics),
        );
        self.rooms.insert(
            room_id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.metrics.room_opened();

        debug!(
            target: "classroom.actor.controller",
            instance_id = %self.instance_id,
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Room actor spawned"
        );
        Ok(handle)
    }

    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            instance_id: self.instance_id.clone(),
            room_count: self.rooms.len(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.depth(),
        }
    }

    /// Remove room actors whose task has finished.
    async fn check_room_health(&mut self) {
        let finished: Vec<String> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| room_id.clone())
            .collect();

        for room_id in finished {
            if let Some(managed) = self.rooms.remove(&room_id) {
                self.reap(&room_id, managed).await;
            }
        }
    }

    /// Collect a room actor that has stopped or is stopping.
    async fn reap(&self, room_id: &str, managed: ManagedRoom) {
        match tokio::time::timeout(ROOM_SHUTDOWN_TIMEOUT, managed.task_handle).await {
            Ok(Ok(())) => {
                debug!(
                    target: "classroom.actor.controller",
                    instance_id = %self.instance_id,
                    room_id = %room_id,
                    "Room actor exited cleanly"
                );
            }
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    error!(
                        target: "classroom.actor.controller",
                        instance_id = %self.instance_id,
                        room_id = %room_id,
                        error = ?join_error,
                        "Room actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Room);
                }
            }
            Err(_) => {
                warn!(
                    target: "classroom.actor.controller",
                    instance_id = %self.instance_id,
                    room_id = %room_id,
                    "Room actor did not stop in time"
                );
            }
        }
        self.metrics.room_closed();
    }

    async fn graceful_shutdown(&mut self) {
        info!(
            target: "classroom.actor.controller",
            instance_id = %self.instance_id,
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        let rooms: Vec<(String, ManagedRoom)> = self.rooms.drain().collect();
        for (room_id, managed) in rooms {
            self.reap(&room_id, managed).await;
        }

        info!(
            target: "classroom.actor.controller",
            instance_id = %self.instance_id,
            "Graceful shutdown complete"
        );
    }
}
