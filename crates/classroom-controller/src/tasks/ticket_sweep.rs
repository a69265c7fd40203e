//! Ticket expiry sweep.
//!
//! Pending tickets older than the TTL are already unusable: every consume
//! path checks expiry under the store lock. The sweep only reclaims memory
//! and records the `expired` outcome for tickets nobody touched again.

use crate::tickets::TicketStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Start the ticket sweep background task.
///
/// Runs until `cancel_token` is cancelled.
#[instrument(skip_all, name = "classroom.tasks.ticket_sweep")]
pub async fn start_ticket_sweep(
    tickets: Arc<TicketStore>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "classroom.tasks.ticket_sweep",
        interval_seconds = interval.as_secs(),
        ttl_seconds = tickets.ttl().as_secs(),
        "Starting ticket sweep task"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_sweep(&tickets);
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "classroom.tasks.ticket_sweep",
                    "Ticket sweep task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(
        target: "classroom.tasks.ticket_sweep",
        "Ticket sweep task stopped"
    );
}

/// Run a single sweep. Returns how many tickets expired.
pub(crate) fn run_sweep(tickets: &TicketStore) -> usize {
    let expired = tickets.sweep_expired();
    if expired > 0 {
        debug!(
            target: "classroom.tasks.ticket_sweep",
            expired = expired,
            remaining = tickets.pending_count(),
            "Expired tickets removed"
        );
    }
    expired
}
