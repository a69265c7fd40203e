//! One-shot approval tickets.
//!
//! A ticket is created Pending by a request operation and then leaves the
//! store exactly once: consumed by an approve or reject handler, revoked,
//! purged with its room, or swept after its TTL. Every transition happens
//! under the store's single lock, so concurrent consumers and the sweep
//! cannot both win the same ticket.
//!
//! Callers cannot tell an expired or already-consumed ticket from one that
//! never existed; all of them read as [`RoomError::TicketNotFound`].

use crate::errors::RoomError;
use crate::observability::metrics;
use crate::roles::{DeviceType, Role};
use ring::rand::{SecureRandom, SystemRandom};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Random bytes per ticket id (hex-encoded to 32 characters).
const TICKET_ID_BYTES: usize = 16;

/// Kind of approval flow a ticket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketKind {
    DeviceControl,
    SpeechRequest,
    RoleUpgrade,
}

impl TicketKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TicketKind::DeviceControl => "device_control",
            TicketKind::SpeechRequest => "speech_request",
            TicketKind::RoleUpgrade => "role_upgrade",
        }
    }
}

/// Kind-specific ticket data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketPayload {
    /// An Assistant asks `target_id` to switch a device on.
    DeviceControl {
        requester_id: String,
        target_id: String,
        device: DeviceType,
        enable: bool,
    },
    /// An Audience member asks the Assistant for a seat.
    SpeechRequest {
        applicant_id: String,
        assistant_id: String,
    },
    /// An Assistant invites `target_id` to take `role`.
    RoleUpgrade {
        inviter_id: String,
        target_id: String,
        role: Role,
    },
}

impl TicketPayload {
    #[must_use]
    pub fn kind(&self) -> TicketKind {
        match self {
            TicketPayload::DeviceControl { .. } => TicketKind::DeviceControl,
            TicketPayload::SpeechRequest { .. } => TicketKind::SpeechRequest,
            TicketPayload::RoleUpgrade { .. } => TicketKind::RoleUpgrade,
        }
    }

    /// The member expected to answer the ticket.
    #[must_use]
    pub fn addressee(&self) -> &str {
        match self {
            TicketPayload::DeviceControl { target_id, .. }
            | TicketPayload::RoleUpgrade { target_id, .. } => target_id,
            TicketPayload::SpeechRequest { assistant_id, .. } => assistant_id,
        }
    }
}

/// A pending approval ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub room_id: String,
    pub payload: TicketPayload,
    pub created_at: Instant,
}

/// Semantic outcome chosen by the handler that consumed a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketOutcome {
    Approved,
    Rejected,
}

impl TicketOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TicketOutcome::Approved => "approved",
            TicketOutcome::Rejected => "rejected",
        }
    }
}

/// Pending tickets with TTL-based expiry.
#[derive(Debug)]
pub struct TicketStore {
    pending: Mutex<HashMap<String, Ticket>>,
    ttl: Duration,
    rng: SystemRandom,
}

impl TicketStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
            rng: SystemRandom::new(),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Ticket>> {
        // Critical sections never panic mid-mutation, so a poisoned map is still coherent.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, ticket: &Ticket, now: Instant) -> bool {
        now.saturating_duration_since(ticket.created_at) >= self.ttl
    }

    fn generate_id(&self) -> Result<String, RoomError> {
        let mut bytes = [0u8; TICKET_ID_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| RoomError::Internal("ticket id generation failed".to_string()))?;
        Ok(hex::encode(bytes))
    }

    /// Store a new pending ticket and return its id.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the system RNG fails.
    pub fn create(&self, room_id: &str, payload: TicketPayload) -> Result<String, RoomError> {
        let id = self.generate_id()?;
        let kind = payload.kind();
        let ticket = Ticket {
            id: id.clone(),
            room_id: room_id.to_string(),
            payload,
            created_at: Instant::now(),
        };
        self.lock().insert(id.clone(), ticket);

        metrics::record_ticket_created(kind.as_str());
        debug!(
            target: "classroom.tickets",
            room_id = %room_id,
            kind = kind.as_str(),
            "Ticket created"
        );
        Ok(id)
    }

    /// Copy of a live pending ticket, without consuming it.
    #[must_use]
    pub fn peek(&self, ticket_id: &str) -> Option<Ticket> {
        let now = Instant::now();
        self.lock()
            .get(ticket_id)
            .filter(|t| !self.is_expired(t, now))
            .cloned()
    }

    /// Consume a ticket. Exactly one caller can succeed per ticket.
    ///
    /// # Errors
    ///
    /// Returns `TicketNotFound` if the ticket is unknown, consumed or expired.
    pub fn consume(&self, ticket_id: &str) -> Result<Ticket, RoomError> {
        self.consume_if(ticket_id, |_| true)
    }

    /// Consume a ticket only if `accept` holds for it. A rejected ticket is
    /// left pending and reported as `TicketNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `TicketNotFound` if the ticket is unknown, consumed, expired,
    /// or not accepted.
    pub fn consume_if(
        &self,
        ticket_id: &str,
        accept: impl FnOnce(&Ticket) -> bool,
    ) -> Result<Ticket, RoomError> {
        let now = Instant::now();
        let mut pending = self.lock();

        let Some(ticket) = pending.get(ticket_id) else {
            return Err(RoomError::TicketNotFound);
        };
        if self.is_expired(ticket, now) {
            let kind = ticket.payload.kind();
            pending.remove(ticket_id);
            metrics::record_ticket_resolved(kind.as_str(), "expired");
            return Err(RoomError::TicketNotFound);
        }
        if !accept(ticket) {
            return Err(RoomError::TicketNotFound);
        }

        pending.remove(ticket_id).ok_or(RoomError::TicketNotFound)
    }

    /// Drop a pending ticket without an outcome. Returns whether it existed.
    pub fn revoke(&self, ticket_id: &str) -> bool {
        self.lock().remove(ticket_id).is_some()
    }

    /// Drop every ticket scoped to `room_id`. Returns how many were removed.
    pub fn purge_room(&self, room_id: &str) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, t| t.room_id != room_id);
        before - pending.len()
    }

    /// Remove every ticket older than the TTL. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.lock();
        let mut expired = Vec::new();
        pending.retain(|_, t| {
            let keep = !self.is_expired(t, now);
            if !keep {
                expired.push(t.payload.kind());
            }
            keep
        });
        drop(pending);

        for kind in &expired {
            metrics::record_ticket_resolved(kind.as_str(), "expired");
        }
        expired.len()
    }

    /// Number of tickets currently held (including expired-but-unswept).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of tickets held for `room_id`.
    #[must_use]
    pub fn pending_for_room(&self, room_id: &str) -> usize {
        self.lock().values().filter(|t| t.room_id == room_id).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn speech(applicant: &str) -> TicketPayload {
        TicketPayload::SpeechRequest {
            applicant_id: applicant.to_string(),
            assistant_id: "a".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_opaque() {
        let store = TicketStore::new(Duration::from_secs(60));
        let first = store.create("r1", speech("u1")).unwrap();
        let second = store.create("r1", speech("u1")).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.len(), TICKET_ID_BYTES * 2);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_consume_once() {
        let store = TicketStore::new(Duration::from_secs(60));
        let id = store.create("r1", speech("u1")).unwrap();

        let ticket = store.consume(&id).unwrap();
        assert_eq!(ticket.payload, speech("u1"));
        assert_eq!(ticket.room_id, "r1");
        assert_eq!(store.consume(&id), Err(RoomError::TicketNotFound));
    }

    #[tokio::test]
    async fn test_unknown_ticket_not_found() {
        let store = TicketStore::new(Duration::from_secs(60));
        assert_eq!(store.consume("deadbeef"), Err(RoomError::TicketNotFound));
    }

    #[tokio::test]
    async fn test_concurrent_consume_has_one_winner() {
        let store = Arc::new(TicketStore::new(Duration::from_secs(60)));
        let id = store.create("r1", speech("u1")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move { store.consume(&id) }));
        }

        let mut wins = 0;
        let mut not_found = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(RoomError::TicketNotFound) => not_found += 1,
                Err(other) => unreachable!("unexpected error {other:?}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(not_found, 15);
    }

    #[tokio::test]
    async fn test_consume_if_leaves_rejected_ticket_pending() {
        let store = TicketStore::new(Duration::from_secs(60));
        let id = store.create("r1", speech("u1")).unwrap();

        let result = store.consume_if(&id, |t| t.room_id == "other-room");
        assert_eq!(result, Err(RoomError::TicketNotFound));
        assert!(store.peek(&id).is_some());

        assert!(store.consume_if(&id, |t| t.room_id == "r1").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_ticket_not_consumable_before_sweep() {
        let store = TicketStore::new(Duration::from_secs(30));
        let id = store.create("r1", speech("u1")).unwrap();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(store.peek(&id).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.peek(&id).is_none());
        assert_eq!(store.consume(&id), Err(RoomError::TicketNotFound));
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let store = TicketStore::new(Duration::from_secs(30));
        let old = store.create("r1", speech("old")).unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        let fresh = store.create("r1", speech("fresh")).unwrap();

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(store.sweep_expired(), 1);
        assert!(store.peek(&old).is_none());
        assert!(store.peek(&fresh).is_some());
    }

    #[tokio::test]
    async fn test_purge_room_and_revoke() {
        let store = TicketStore::new(Duration::from_secs(60));
        let keep = store.create("r2", speech("u1")).unwrap();
        store.create("r1", speech("u1")).unwrap();
        store.create("r1", speech("u2")).unwrap();

        assert_eq!(store.pending_for_room("r1"), 2);
        assert_eq!(store.purge_room("r1"), 2);
        assert_eq!(store.pending_for_room("r1"), 0);

        assert!(store.revoke(&keep));
        assert!(!store.revoke(&keep));
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_payload_addressee() {
        let upgrade = TicketPayload::RoleUpgrade {
            inviter_id: "a".to_string(),
            target_id: "s".to_string(),
            role: Role::Teacher,
        };
        assert_eq!(upgrade.addressee(), "s");
        assert_eq!(upgrade.kind(), TicketKind::RoleUpgrade);
        assert_eq!(speech("u").addressee(), "a");
    }
}
