//! Background tasks.
//!
//! - `ticket_sweep` - removes approval tickets older than the configured TTL

pub mod ticket_sweep;

pub use ticket_sweep::start_ticket_sweep;
