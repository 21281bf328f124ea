//! Signature Verifier: checks a submitted `(message, signature)` pair
//! against the nonce outstanding on the caller's session.
//!
//! Verification is pure. It reads the expected nonce and the clock but never
//! mutates session state; consuming the nonce is the materializer's job.

use super::address::Address;
use super::message::{ParseError, SiweMessage};
use super::signature::{recover_address, SignatureError};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] ParseError),

    #[error("nonce does not match the session nonce")]
    NonceMismatch,

    #[error("message has expired")]
    ExpiredMessage,

    #[error("message is not yet valid")]
    MessageNotYetValid,

    #[error("domain {actual} does not match {expected}")]
    DomainMismatch { expected: String, actual: String },

    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("You have to first sign_in")]
    SessionMissing,
}

/// Server-side policy applied on top of the protocol gates.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// When set, messages for any other domain are rejected.
    pub expected_domain: Option<String>,
}

/// A message whose signature checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    pub address: Address,
    pub message: SiweMessage,
}

pub type VerificationResult = Result<VerifiedMessage, VerificationError>;

/// Run every verification gate in order. The first failing gate decides the
/// error.
///
/// `expected_nonce` is the nonce currently stored on the session, `None` when
/// the session has no outstanding nonce.
pub fn verify(
    message: &str,
    signature: &str,
    expected_nonce: Option<&str>,
    options: &VerifyOptions,
    now: DateTime<Utc>,
) -> VerificationResult {
    let parsed: SiweMessage = message.parse()?;

    match expected_nonce {
        Some(expected) if expected == parsed.nonce => {}
        _ => return Err(VerificationError::NonceMismatch),
    }

    if let Some(expiration_time) = &parsed.expiration_time {
        if expiration_time.instant() <= now {
            return Err(VerificationError::ExpiredMessage);
        }
    }

    if let Some(not_before) = &parsed.not_before {
        if not_before.instant() > now {
            return Err(VerificationError::MessageNotYetValid);
        }
    }

    if let Some(expected) = &options.expected_domain {
        if *expected != parsed.domain {
            return Err(VerificationError::DomainMismatch {
                expected: expected.clone(),
                actual: parsed.domain,
            });
        }
    }

    // Recover over the submitted bytes, not a re-rendering of them
    let recovered = recover_address(message.as_bytes(), signature)?;
    if recovered != parsed.address {
        return Err(SignatureError::SignerMismatch {
            claimed: parsed.address,
            recovered,
        }
        .into());
    }

    Ok(VerifiedMessage {
        address: recovered,
        message: parsed,
    })
}
