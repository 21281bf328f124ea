//! Sign-In with Ethereum protocol core: message format, nonces, signature
//! recovery and verification. No HTTP or storage concerns live here.

pub mod address;
pub mod message;
pub mod nonce;
pub mod signature;
pub mod verify;

pub use address::Address;
pub use message::{SiweMessage, Timestamp};
pub use nonce::generate_nonce;
pub use verify::{verify, VerificationError, VerificationResult, VerifiedMessage, VerifyOptions};
