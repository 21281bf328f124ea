//! EIP-191 personal-message hashing and secp256k1 address recovery.

use super::address::Address;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use tiny_keccak::{Hasher, Keccak};

/// Length of an `r || s || v` signature in bytes.
pub const SIGNATURE_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signature is not valid hex")]
    InvalidHex,

    #[error("signature must be {SIGNATURE_LEN} bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("malformed ECDSA signature")]
    Malformed,

    #[error("public key recovery failed")]
    RecoveryFailed,

    #[error("signed by {recovered}, message claims {claimed}")]
    SignerMismatch { claimed: Address, recovered: Address },
}

/// Hash of `"\x19Ethereum Signed Message:\n" || len(message) || message`,
/// the digest wallets sign for `personal_sign`.
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(b"\x19Ethereum Signed Message:\n");
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Decode a hex signature (`0x` prefix optional) into its 65 raw bytes.
pub fn decode_signature(signature_hex: &str) -> Result<[u8; SIGNATURE_LEN], SignatureError> {
    let stripped = signature_hex
        .strip_prefix("0x")
        .unwrap_or(signature_hex);
    let bytes = hex::decode(stripped).map_err(|_| SignatureError::InvalidHex)?;

    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| SignatureError::InvalidLength(bytes.len()))
}

/// Recover the address that produced `signature` over the EIP-191 hash of
/// `message`.
pub fn recover_address(message: &[u8], signature_hex: &str) -> Result<Address, SignatureError> {
    let bytes = decode_signature(signature_hex)?;
    let (rs, v) = bytes.split_at(64);

    let recovery_byte = match v[0] {
        0 | 27 => 0,
        1 | 28 => 1,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id =
        RecoveryId::from_byte(recovery_byte).ok_or(SignatureError::InvalidRecoveryId(v[0]))?;

    let signature = Signature::from_slice(rs).map_err(|_| SignatureError::Malformed)?;

    let digest = eip191_hash(message);
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_of(&verifying_key))
}

/// Ethereum address of a secp256k1 public key.
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let encoded = verifying_key.to_encoded_point(false);
    // skip the 0x04 SEC1 tag
    Address::from_public_key(&encoded.as_bytes()[1..])
}
