//! Classroom controller configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default non-audience seats per room.
pub const DEFAULT_MAX_SEATS: usize = 16;

/// Default approval ticket TTL in seconds.
pub const DEFAULT_TICKET_TTL_SECONDS: u64 = 60;

/// Default interval between ticket sweeps in seconds.
pub const DEFAULT_TICKET_SWEEP_INTERVAL_SECONDS: u64 = 5;

/// Default maximum room lifetime in seconds (0 disables expiry).
pub const DEFAULT_ROOM_MAX_LIFETIME_SECONDS: u64 = 0;

/// Default session token lifetime in seconds.
pub const DEFAULT_SESSION_TOKEN_TTL_SECONDS: u64 = 86_400;

/// Default timeout for collaborator HTTP calls in milliseconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 5_000;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "classroom";

/// Minimum session signing key length for HMAC-SHA256 (32 bytes).
pub const MIN_SESSION_SECRET_LENGTH: usize = 32;

/// Classroom controller configuration.
#[derive(Clone)]
pub struct Config {
    /// HS256 key for session tokens.
    pub session_token_secret: SecretString,

    /// Base URL of the messaging collaborator.
    pub messaging_url: String,

    /// Bearer credential for the messaging collaborator.
    pub messaging_api_key: SecretString,

    /// Base URL of the whiteboard collaborator.
    pub whiteboard_url: String,

    /// Maximum non-audience members per room.
    pub max_seats: usize,

    /// Lifetime of a pending approval ticket.
    pub ticket_ttl_seconds: u64,

    /// Period of the ticket sweep task.
    pub ticket_sweep_interval_seconds: u64,

    /// Rooms older than this are force-destroyed (0 disables).
    pub room_max_lifetime_seconds: u64,

    /// Lifetime of minted session tokens.
    pub session_token_ttl_seconds: u64,

    /// Timeout applied to every collaborator HTTP call.
    pub upstream_timeout_ms: u64,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this instance.
    pub instance_id: String,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("session_token_secret", &"[REDACTED]")
            .field("messaging_url", &self.messaging_url)
            .field("messaging_api_key", &"[REDACTED]")
            .field("whiteboard_url", &self.whiteboard_url)
            .field("max_seats", &self.max_seats)
            .field("ticket_ttl_seconds", &self.ticket_ttl_seconds)
            .field(
                "ticket_sweep_interval_seconds",
                &self.ticket_sweep_interval_seconds,
            )
            .field("room_max_lifetime_seconds", &self.room_max_lifetime_seconds)
            .field("session_token_ttl_seconds", &self.session_token_ttl_seconds)
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .field("health_bind_address", &self.health_bind_address)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let session_token_secret =
            SecretString::from(required(vars, "CLASSROOM_SESSION_TOKEN_SECRET")?);
        if session_token_secret.expose_secret().len() < MIN_SESSION_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "CLASSROOM_SESSION_TOKEN_SECRET must be at least {MIN_SESSION_SECRET_LENGTH} bytes"
            )));
        }

        let messaging_url = required(vars, "MESSAGING_URL")?;
        let messaging_api_key = SecretString::from(required(vars, "MESSAGING_API_KEY")?);
        let whiteboard_url = required(vars, "WHITEBOARD_URL")?;

        let max_seats = vars
            .get("CLASSROOM_MAX_SEATS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_SEATS);
        if max_seats == 0 {
            return Err(ConfigError::InvalidValue(
                "CLASSROOM_MAX_SEATS must be at least 1".to_string(),
            ));
        }

        let ticket_ttl_seconds = vars
            .get("CLASSROOM_TICKET_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TICKET_TTL_SECONDS);

        let ticket_sweep_interval_seconds = vars
            .get("CLASSROOM_TICKET_SWEEP_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(DEFAULT_TICKET_SWEEP_INTERVAL_SECONDS);

        let room_max_lifetime_seconds = vars
            .get("CLASSROOM_ROOM_MAX_LIFETIME_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_ROOM_MAX_LIFETIME_SECONDS);

        let session_token_ttl_seconds = vars
            .get("CLASSROOM_SESSION_TOKEN_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TOKEN_TTL_SECONDS);

        let upstream_timeout_ms = vars
            .get("CLASSROOM_UPSTREAM_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_MS);

        let health_bind_address = vars
            .get("CLASSROOM_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let instance_id = vars.get("CLASSROOM_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            session_token_secret,
            messaging_url,
            messaging_api_key,
            whiteboard_url,
            max_seats,
            ticket_ttl_seconds,
            ticket_sweep_interval_seconds,
            room_max_lifetime_seconds,
            session_token_ttl_seconds,
            upstream_timeout_ms,
            health_bind_address,
            instance_id,
        })
    }

    /// Ticket TTL as a `Duration`.
    #[must_use]
    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.ticket_ttl_seconds)
    }

    /// Sweep period as a `Duration`.
    #[must_use]
    pub fn ticket_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.ticket_sweep_interval_seconds)
    }

    /// Room lifetime limit, `None` when disabled.
    #[must_use]
    pub fn room_max_lifetime(&self) -> Option<Duration> {
        (self.room_max_lifetime_seconds > 0)
            .then(|| Duration::from_secs(self.room_max_lifetime_seconds))
    }

    /// Session token lifetime as a `Duration`.
    #[must_use]
    pub fn session_token_ttl(&self) -> Duration {
        Duration::from_secs(self.session_token_ttl_seconds)
    }

    /// Collaborator timeout as a `Duration`.
    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}
