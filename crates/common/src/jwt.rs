//! Session token utilities.
//!
//! A session token identifies one user inside one room. It is an HS256 JWT
//! signed with the service's session key and carries `{sub, name, room, iat,
//! exp}`.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Only HS256 is accepted on decode
//! - Error messages are generic; all failures read the same to a caller
//! - `sub` and `name` are redacted in `Debug` output

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Maximum accepted token size in bytes (8KB).
///
/// Session tokens are a few hundred bytes. Anything larger is rejected before
/// base64 decoding or signature checks.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Clock skew tolerated on `iat` and `exp`.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Errors from minting or verifying session tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The session token is invalid or expired")]
    TokenTooLarge,

    /// Signature, structure or claims did not verify.
    #[error("The session token is invalid or expired")]
    InvalidToken,

    /// `iat` lies further in the future than the allowed skew.
    #[error("The session token is invalid or expired")]
    IatTooFarInFuture,

    /// Signing failed.
    #[error("Failed to sign session token")]
    SigningFailed,
}

/// Claims of a room session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id.
    pub sub: String,

    /// Display name chosen at join.
    pub name: String,

    /// Room the session is bound to.
    pub room: String,

    /// Issued-at (Unix epoch seconds).
    pub iat: i64,

    /// Expiry (Unix epoch seconds).
    pub exp: i64,
}

impl fmt::Debug for SessionClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClaims")
            .field("sub", &"[REDACTED]")
            .field("name", &"[REDACTED]")
            .field("room", &self.room)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

impl SessionClaims {
    /// Build claims issued at `now` and valid for `ttl`.
    #[must_use]
    pub fn new(user_id: &str, user_name: &str, room_id: &str, now: i64, ttl: Duration) -> Self {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            sub: user_id.to_string(),
            name: user_name.to_string(),
            room: room_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_secs),
        }
    }
}

/// Sign `claims` with HS256.
///
/// # Errors
///
/// Returns `SigningFailed` if the encoder rejects the key or claims.
pub fn encode_session_token(
    claims: &SessionClaims,
    secret: &[u8],
) -> Result<String, JwtValidationError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|_| JwtValidationError::SigningFailed)
}

/// Verify an HS256 session token and return its claims.
///
/// # Errors
///
/// - `TokenTooLarge` if the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `InvalidToken` for bad signatures, wrong algorithms, malformed tokens or expiry
/// - `IatTooFarInFuture` if `iat` is beyond the allowed clock skew
pub fn decode_session_token(
    token: &str,
    secret: &[u8],
    now: i64,
) -> Result<SessionClaims, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    validation.leeway = DEFAULT_CLOCK_SKEW.as_secs();

    let data = decode::<SessionClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|_| JwtValidationError::InvalidToken)?;

    validate_iat(data.claims.iat, now, DEFAULT_CLOCK_SKEW)?;
    Ok(data.claims)
}

/// Reject tokens whose `iat` is more than `clock_skew` ahead of `now`.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` when the check fails.
pub fn validate_iat(iat: i64, now: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    if iat > now.saturating_add(skew) {
        return Err(JwtValidationError::IatTooFarInFuture);
    }
    Ok(())
}
