//! Single-use nonce generation and format validation.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of generated nonces. 17 alphanumeric characters carry ~101 bits.
pub const NONCE_LEN: usize = 17;

/// Generate a cryptographically random alphanumeric nonce.
pub fn generate_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

/// Nonce charset check applied when parsing a message.
///
/// Length is not enforced here: a short nonce can never equal an issued one,
/// so it is rejected by the session comparison instead.
pub fn is_valid_nonce(nonce: &str) -> bool {
    !nonce.is_empty() && nonce.chars().all(|c| c.is_ascii_alphanumeric())
}
