//! Secret types for protecting credentials from accidental logging.
//!
//! Re-exports the [`secrecy`] wrappers. `SecretString` and `SecretBox<T>`
//! redact themselves in `Debug`, so structs that derive `Debug` over a secret
//! field stay safe to log. Values are zeroized on drop.
//!
//! In this workspace they hold the session-token signing key and the
//! messaging collaborator's API key.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let key = SecretString::from("signing-key");
//! assert!(!format!("{key:?}").contains("signing-key"));
//! assert_eq!(key.expose_secret(), "signing-key");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_signing_key_debug_is_redacted() {
        let key = SecretString::from("room-signing-key");
        let debug_str = format!("{key:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("room-signing-key"));
    }

    #[test]
    fn test_collaborator_credentials_deserialize_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct CollaboratorCredentials {
            base_url: String,
            api_key: SecretString,
        }

        let json = r#"{"base_url": "http://messaging.local", "api_key": "k-123"}"#;
        let creds: CollaboratorCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.api_key.expose_secret(), "k-123");
        let debug = format!("{creds:?}");
        assert!(debug.contains("messaging.local"));
        assert!(!debug.contains("k-123"));
    }
}
