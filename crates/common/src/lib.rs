//! Common utilities and types shared across the classroom workspace.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for session token claims and signing helpers
pub mod jwt;
