// src/wallet/key_management.rs
//! Cryptographic key management for the issuing account.
//!
//! The service holds exactly one secp256k1 key: the account that submits
//! `certify`, `revoke` and `transfer` transactions. The same type is used by
//! holders (and tests) to sign ownership challenges.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - Keccak-256 / EIP-191 message hashing (via `ethers` crate)
//! - Cryptographically secure random number generation

use crate::error::CredentialError;
use crate::utils::crypto::{address_of, sign_message};
use ethers::types::{Address, Signature};
use ethers::utils::hex;
use k256::ecdsa::SigningKey;
use std::fmt;

/// Secure key management for one Ethereum account.
///
/// # Security Notes
/// - The signing key is never exposed through `Debug`
/// - Signatures use deterministic ECDSA (RFC 6979)
#[derive(Clone)]
pub struct KeyManager {
    signing_key: SigningKey,
    address: Address,
}

impl KeyManager {
    /// Generates a KeyManager with a fresh random key.
    pub fn new() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
    }

    /// Loads a key from its hex encoding (with or without `0x` prefix).
    ///
    /// # Errors
    /// Returns `CredentialError::InvalidRequest` if the string is not hex or
    /// not a valid secp256k1 scalar.
    pub fn from_hex(private_key: &str) -> Result<Self, CredentialError> {
        let digits = private_key.trim().trim_start_matches("0x");
        let bytes = hex::decode(digits)
            .map_err(|_| CredentialError::InvalidRequest("private key is not hex".to_string()))?;
        let signing_key = SigningKey::from_slice(&bytes).map_err(|_| {
            CredentialError::InvalidRequest("private key is not a valid secp256k1 key".to_string())
        })?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(&signing_key);
        KeyManager { signing_key, address }
    }

    /// Ethereum address of the managed key.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Signs a message the way wallets do for `personal_sign`.
    ///
    /// # Returns
    /// 65-byte recoverable signature (r || s || v)
    pub fn sign_message(&self, message: &[u8]) -> Result<Signature, CredentialError> {
        sign_message(message, &self.signing_key)
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("address", &self.address)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::recover_address;

    // Well-known test key (ethers documentation)
    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn loads_key_with_and_without_prefix() {
        let plain = KeyManager::from_hex(TEST_KEY).unwrap();
        let prefixed = KeyManager::from_hex(&format!("0x{}", TEST_KEY)).unwrap();
        assert_eq!(plain.address(), prefixed.address());
        assert_eq!(
            format!("{:?}", plain.address()),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(KeyManager::from_hex("zz").is_err());
        assert!(KeyManager::from_hex("").is_err());
        assert!(KeyManager::from_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn signatures_recover_to_manager_address() {
        let keys = KeyManager::new();
        let signature = keys.sign_message(b"challenge").unwrap();
        assert_eq!(recover_address(b"challenge", &signature).unwrap(), keys.address());
    }

    #[test]
    fn debug_never_prints_key_material() {
        let keys = KeyManager::from_hex(TEST_KEY).unwrap();
        let rendered = format!("{:?}", keys);
        assert!(!rendered.contains(TEST_KEY));
        assert!(rendered.contains("[REDACTED]"));
    }
}
