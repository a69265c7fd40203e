//! Observability for the classroom controller.
//!
//! Metric labels are bounded:
//! - `operation`: the public operation catalogue (~25 values)
//! - `status`: success plus the five error kinds
//! - `kind`: three ticket kinds
//! - `outcome`: approved, rejected, expired
//! - `delivery`: required, best_effort
//! - `actor_type`: controller, room
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `classroom_rooms_active` | Gauge | none |
//! | `classroom_operations_total` | Counter | `operation`, `status` |
//! | `classroom_operation_duration_seconds` | Histogram | `operation` |
//! | `classroom_tickets_created_total` | Counter | `kind` |
//! | `classroom_tickets_resolved_total` | Counter | `kind`, `outcome` |
//! | `classroom_notifications_failed_total` | Counter | `delivery` |
//! | `classroom_actor_mailbox_depth` | Gauge | `actor_type` |
//! | `classroom_actor_panics_total` | Counter | `actor_type` |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState, Phase};
pub use metrics::{init_metrics_recorder, metrics_router};
