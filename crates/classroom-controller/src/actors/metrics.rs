//! Counters shared by the controller and room actors, plus mailbox
//! pressure tracking.
//!
//! Pressure bands per actor:
//!
//! | Actor      | Calm   | Elevated  | Saturated |
//! |------------|--------|-----------|-----------|
//! | Controller | ≤ 200  | 201-1000  | > 1000    |
//! | Room       | ≤ 50   | 51-250    | > 250     |
//!
//! A room mailbox rarely holds more than a handful of requests; a saturated
//! room usually means a collaborator is stalling every operation.

use crate::observability::metrics;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bounds of the calm and elevated bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureBands {
    pub calm: usize,
    pub elevated: usize,
}

const CONTROLLER_BANDS: PressureBands = PressureBands {
    calm: 200,
    elevated: 1000,
};

const ROOM_BANDS: PressureBands = PressureBands {
    calm: 50,
    elevated: 250,
};

/// Which kind of actor a monitor or counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Controller,
    Room,
}

impl ActorType {
    /// Label value for the `actor_type` metric label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ActorType::Controller => "controller",
            ActorType::Room => "room",
        }
    }

    #[must_use]
    pub const fn bands(self) -> PressureBands {
        match self {
            ActorType::Controller => CONTROLLER_BANDS,
            ActorType::Room => ROOM_BANDS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MailboxPressure {
    Calm,
    Elevated,
    Saturated,
}

impl PressureBands {
    #[must_use]
    pub const fn classify(self, depth: usize) -> MailboxPressure {
        if depth > self.elevated {
            MailboxPressure::Saturated
        } else if depth > self.calm {
            MailboxPressure::Elevated
        } else {
            MailboxPressure::Calm
        }
    }
}

/// In-flight request count for one actor's mailbox.
///
/// The owning actor brackets each handled message with [`begin`] and
/// [`finish`]; crossing into a higher band is logged once per crossing.
///
/// [`begin`]: MailboxMonitor::begin
/// [`finish`]: MailboxMonitor::finish
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    owner: String,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
    handled: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, owner: impl Into<String>) -> Self {
        Self {
            actor_type,
            owner: owner.into(),
            in_flight: AtomicUsize::new(0),
            high_water: AtomicUsize::new(0),
            handled: AtomicU64::new(0),
        }
    }

    pub fn begin(&self) {
        let before = self.in_flight.fetch_add(1, Ordering::Relaxed);
        let depth = before + 1;
        self.high_water.fetch_max(depth, Ordering::Relaxed);
        metrics::set_actor_mailbox_depth(self.actor_type.label(), depth);

        let bands = self.actor_type.bands();
        let (was, now) = (bands.classify(before), bands.classify(depth));
        if now <= was {
            return;
        }
        match now {
            MailboxPressure::Saturated => warn!(
                target: "classroom.actor.mailbox",
                actor_type = self.actor_type.label(),
                owner = %self.owner,
                depth = depth,
                "Mailbox saturated"
            ),
            MailboxPressure::Elevated => debug!(
                target: "classroom.actor.mailbox",
                actor_type = self.actor_type.label(),
                owner = %self.owner,
                depth = depth,
                "Mailbox pressure elevated"
            ),
            MailboxPressure::Calm => {}
        }
    }

    pub fn finish(&self) {
        let before = self
            .in_flight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        self.handled.fetch_add(1, Ordering::Relaxed);
        metrics::set_actor_mailbox_depth(self.actor_type.label(), before.saturating_sub(1));
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn pressure(&self) -> MailboxPressure {
        self.actor_type.bands().classify(self.depth())
    }
}

/// Process-wide room counters, shared between the controller handle, the
/// controller actor and every room actor.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    open_rooms: AtomicUsize,
    panics: AtomicU64,
    handled: AtomicU64,
    reroutes: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_opened(&self) {
        let open = self.open_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_rooms_active(open);
    }

    pub fn room_closed(&self) {
        let before = self
            .open_rooms
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        metrics::set_rooms_active(before.saturating_sub(1));
    }

    pub fn record_panic(&self, actor_type: ActorType) {
        self.panics.fetch_add(1, Ordering::Relaxed);
        metrics::record_actor_panic(actor_type.label());
    }

    pub fn record_handled(&self) {
        self.handled.fetch_add(1, Ordering::Relaxed);
    }

    /// A request reached a room actor that had already torn its room down.
    pub fn record_reroute(&self) {
        self.reroutes.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn open_rooms(&self) -> usize {
        self.open_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn reroutes(&self) -> u64 {
        self.reroutes.load(Ordering::Relaxed)
    }
}
