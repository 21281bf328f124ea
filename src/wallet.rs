//! Wallet signer capability.
//!
//! The server never holds keys; this is what a client (or a test) plugs in
//! to produce `personal_sign` signatures over a signing message.

use crate::siwe::address::Address;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use zeroize::Zeroizing;

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Anything that can sign a message as an Ethereum account.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-191 `personal_sign`: returns `0x`-prefixed `r || s || v` hex.
    async fn sign_message(&self, message: &str) -> Result<String, WalletError>;
}

/// A wallet backed by an in-process secp256k1 private key.
pub struct LocalWallet {
    signer: PrivateKeySigner,
}

impl LocalWallet {
    /// Load from a hex private key, `0x` prefix optional.
    pub fn from_hex(private_key_hex: &str) -> Result<Self, WalletError> {
        let stripped = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);
        let bytes = Zeroizing::new(
            hex::decode(stripped).map_err(|e| WalletError::InvalidKey(e.to_string()))?,
        );
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| WalletError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    /// Fresh random key.
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address().into()
    }

    pub fn private_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("0x{}", hex::encode(self.signer.to_bytes())))
    }

    /// Synchronous `personal_sign`.
    pub fn sign(&self, message: &str) -> Result<String, WalletError> {
        let signature = self
            .signer
            .sign_message_sync(message.as_bytes())
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        LocalWallet::address(self)
    }

    async fn sign_message(&self, message: &str) -> Result<String, WalletError> {
        self.sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::siwe::signature::recover_address;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_from_hex_with_and_without_prefix() {
        let a = LocalWallet::from_hex(DEV_KEY).unwrap();
        let b = LocalWallet::from_hex(DEV_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(
            a.address().to_checksum(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(matches!(
            LocalWallet::from_hex("0x1234"),
            Err(WalletError::InvalidKey(_))
        ));
        assert!(matches!(
            LocalWallet::from_hex("not hex"),
            Err(WalletError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_message_recovers_to_address() {
        let wallet = LocalWallet::random();
        let signature = wallet.sign_message("hello wallet").await.unwrap();

        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 132);

        let recovered = recover_address(b"hello wallet", &signature).unwrap();
        assert_eq!(recovered, wallet.address());

        // v is in the 27/28 form wallets emit
        let v = &signature[130..];
        assert!(v == "1b" || v == "1c");
    }

    #[test]
    fn test_private_key_roundtrip() {
        let wallet = LocalWallet::random();
        let restored = LocalWallet::from_hex(&wallet.private_key_hex()).unwrap();
        assert_eq!(restored.address(), wallet.address());
    }

    #[test]
    fn test_debug_redacts_key() {
        let wallet = LocalWallet::from_hex(DEV_KEY).unwrap();
        let debug = format!("{:?}", wallet);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("ac0974"));
    }
}
