//! Credential types
//!
//! A `Credential` is what the caller presented (API key or session token);
//! a `CredentialRecord` is what the store knows about it. The raw secret is
//! wrapped in `secrecy::SecretString` so it cannot be logged accidentally:
//! the only loggable/persistable form is the SHA-256 fingerprint.

use crate::identity::{TenantId, UserId};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// How the credential was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// API key (custom header or, when enabled, query parameter).
    ApiKey,
    /// Session token (bearer header or session cookie).
    SessionToken,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::ApiKey => write!(f, "api_key"),
            CredentialKind::SessionToken => write!(f, "session_token"),
        }
    }
}

/// Credential presented by a caller.
///
/// Never implements `Serialize`; the raw value never leaves this type
/// except through `expose()` at the store-lookup boundary.
#[derive(Clone)]
pub struct Credential {
    kind: CredentialKind,
    secret: SecretString,
}

impl Credential {
    pub fn api_key(raw: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::ApiKey,
            secret: SecretString::new(raw.into().into()),
        }
    }

    pub fn session_token(raw: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::SessionToken,
            secret: SecretString::new(raw.into().into()),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// Expose the raw value (use sparingly, only for store lookups and
    /// fingerprinting).
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    /// Whether the presented value is plausibly well-formed. Empty or
    /// whitespace-bearing values are rejected before any store round trip.
    pub fn is_well_formed(&self) -> bool {
        let raw = self.secret.expose_secret();
        !raw.is_empty() && !raw.chars().any(char::is_whitespace)
    }

    /// SHA-256 hex fingerprint of the raw value.
    ///
    /// This is the only form of the credential that may appear in cache
    /// keys, audit records, or store lookups.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Credential({}, [REDACTED, fp {}...])",
            self.kind,
            &self.fingerprint()[..8]
        )
    }
}

/// Store-side state of a credential, fetched by fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub tenant_id: TenantId,
    /// Absent for tenant-only (service) credentials.
    pub user_id: Option<UserId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub scopes: Vec<String>,
}

impl CredentialRecord {
    /// Whether the record has expired as of `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_shows_raw_value() {
        let cred = Credential::api_key("wdn_live_supersecret");
        let debug = format!("{:?}", cred);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_hex() {
        let a = Credential::api_key("token-1");
        let b = Credential::api_key("token-1");
        let c = Credential::api_key("token-2");

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert!(a.fingerprint().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_well_formed_rejects_empty_and_whitespace() {
        assert!(Credential::api_key("abc123").is_well_formed());
        assert!(!Credential::api_key("").is_well_formed());
        assert!(!Credential::session_token("has space").is_well_formed());
    }

    #[test]
    fn test_record_expiry() {
        let now = Utc::now();
        let record = CredentialRecord {
            tenant_id: TenantId::now_v7(),
            user_id: None,
            expires_at: Some(now - chrono::Duration::seconds(1)),
            revoked: false,
            scopes: vec![],
        };
        assert!(record.is_expired(now));

        let fresh = CredentialRecord {
            expires_at: Some(now + chrono::Duration::hours(1)),
            ..record.clone()
        };
        assert!(!fresh.is_expired(now));

        let no_expiry = CredentialRecord {
            expires_at: None,
            ..record
        };
        assert!(!no_expiry.is_expired(now));
    }
}
