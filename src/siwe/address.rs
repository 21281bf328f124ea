//! Ethereum account address (20 bytes) with EIP-55 checksum formatting.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 20-byte Ethereum account identifier.
///
/// Wraps [`alloy_primitives::Address`]. Equality is byte equality, so two
/// addresses that differ only in checksum casing compare equal. `Display`
/// always renders the EIP-55 form, and parsing insists on the `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(alloy_primitives::Address);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address must start with 0x")]
    MissingPrefix,

    #[error("address must be 40 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("address is not valid hex")]
    InvalidHex,

    #[error("address has an invalid EIP-55 checksum")]
    InvalidChecksum,
}

impl Address {
    /// Derive the address of an uncompressed secp256k1 public key
    /// (64 bytes, without the leading 0x04 tag).
    pub fn from_public_key(uncompressed: &[u8]) -> Self {
        Self(alloy_primitives::Address::from_raw_public_key(uncompressed))
    }

    /// EIP-55 mixed-case checksum encoding, `0x`-prefixed.
    pub fn to_checksum(&self) -> String {
        self.0.to_checksum(None)
    }

    /// Parse and require the exact EIP-55 casing (all-lower and all-upper
    /// inputs are rejected as unchecksummed).
    pub fn parse_checksummed(s: &str) -> Result<Self, AddressError> {
        let address = s.parse::<Address>()?;
        if address.to_checksum() != s {
            return Err(AddressError::InvalidChecksum);
        }
        Ok(address)
    }
}

impl From<alloy_primitives::Address> for Address {
    fn from(inner: alloy_primitives::Address) -> Self {
        Self(inner)
    }
}

impl From<Address> for alloy_primitives::Address {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    /// Case-insensitive parse. Checksum casing is not enforced here.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;

        if hex_part.len() != 40 {
            return Err(AddressError::InvalidLength(hex_part.len()));
        }

        hex_part
            .parse::<alloy_primitives::Address>()
            .map(Self)
            .map_err(|_| AddressError::InvalidHex)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
