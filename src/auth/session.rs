//! Server-side session state and identifiers.
//!
//! A session moves `Empty -> Pending(nonce) -> Authenticated(address)` and
//! falls back to `Empty` on a failed verification, logout or expiry.

use crate::siwe::{generate_nonce, Address, VerificationResult};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier carried by the cookie or bearer token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// 32 random bytes, URL-safe base64 without padding (43 characters).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::fill(&mut bytes);
        Self(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accept only well-formed ids so arbitrary client input never becomes a
    /// storage key.
    pub fn parse(raw: &str) -> Option<Self> {
        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(raw).ok()?;
        (decoded.len() == 32).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn redacted(&self) -> &str {
        &self.0[..8.min(self.0.len())]
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({}..)", self.redacted())
    }
}

/// Who a session is signed in as, and until when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    pub address: Address,
    pub chain_id: u64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Session {
    #[default]
    Empty,
    Pending {
        nonce: String,
        issued_at: DateTime<Utc>,
    },
    Authenticated(Authentication),
}

impl Session {
    /// The outstanding, unconsumed nonce.
    pub fn pending_nonce(&self) -> Option<&str> {
        match self {
            Session::Pending { nonce, .. } => Some(nonce),
            _ => None,
        }
    }

    pub fn authentication(&self) -> Option<&Authentication> {
        match self {
            Session::Authenticated(auth) => Some(auth),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Session::Empty)
    }

    /// Authenticated sessions lapse at `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Session::Authenticated(auth) if auth.expires_at <= now)
    }

    /// Nonce Issuer: replace whatever the session held with a fresh pending
    /// nonce. At most one nonce is ever live per session.
    pub fn issue_nonce(&mut self, now: DateTime<Utc>) -> String {
        let nonce = generate_nonce();
        *self = Session::Pending {
            nonce: nonce.clone(),
            issued_at: now,
        };
        nonce
    }

    /// Session Materializer: apply a verification outcome.
    ///
    /// Success consumes the nonce and authenticates the recovered address
    /// until the message's expiration time, or `now + default_ttl` when the
    /// message has none. Failure clears both the nonce and any prior
    /// authentication.
    pub fn materialize(
        &mut self,
        result: &VerificationResult,
        default_ttl: Duration,
        now: DateTime<Utc>,
    ) {
        *self = match result {
            Ok(verified) => {
                let expires_at = verified
                    .message
                    .expiration_time
                    .as_ref()
                    .map(|t| t.instant())
                    .unwrap_or(now + default_ttl);
                Session::Authenticated(Authentication {
                    address: verified.address,
                    chain_id: verified.message.chain_id,
                    expires_at,
                })
            }
            Err(_) => Session::Empty,
        };
    }

    /// How long a store should keep this session. `None` means delete it.
    pub fn time_to_live(
        &self,
        nonce_ttl: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Option<std::time::Duration> {
        match self {
            Session::Empty => None,
            Session::Pending { .. } => Some(nonce_ttl),
            Session::Authenticated(auth) => (auth.expires_at - now).to_std().ok(),
        }
    }
}
