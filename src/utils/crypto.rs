// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! - Keccak-256 (Ethereum's standard hash function) for content hashes
//! - EIP-191 `personal_sign` recoverable signatures over secp256k1
//! - bcrypt for claim passwords
//!
//! The content hash is `keccak256(canonical_json(payload))`. The canonical
//! serialization step is part of the hash contract: two documents that differ
//! only in key order or whitespace hash identically.

use crate::error::CredentialError;
use crate::models::credential::ClaimHash;
use crate::utils::serialization::canonical_bytes;
use ethers::types::{Address, Signature, U256};
use ethers::utils::{hash_message, keccak256};
use k256::ecdsa::SigningKey;
use rand::RngCore;
use serde::Serialize;

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Computes the content hash of a claim payload.
///
/// # Errors
/// Returns `CredentialError::InvalidRequest` if the payload has no JSON
/// representation.
pub fn content_hash<T: Serialize + ?Sized>(payload: &T) -> Result<ClaimHash, CredentialError> {
    let bytes = canonical_bytes(payload)
        .map_err(|e| CredentialError::InvalidRequest(format!("claim is not valid JSON: {}", e)))?;
    Ok(ClaimHash(hash_data(&bytes)))
}

/// Signs `message` the way Ethereum wallets do for `personal_sign`.
///
/// The message is prefixed with `"\x19Ethereum Signed Message:\n" + len`,
/// hashed with Keccak-256 and signed with a recoverable ECDSA signature.
/// The returned signature carries `v` in `{27, 28}`.
pub fn sign_message(message: &[u8], key: &SigningKey) -> Result<Signature, CredentialError> {
    let digest = hash_message(message);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(digest.as_bytes())
        .map_err(|e| CredentialError::Internal(format!("signing failed: {}", e)))?;

    let bytes = signature.to_bytes();
    Ok(Signature {
        r: U256::from_big_endian(&bytes[..32]),
        s: U256::from_big_endian(&bytes[32..]),
        v: u64::from(recovery_id.to_byte()) + 27,
    })
}

/// Recovers the address whose key produced `signature` over `message`.
///
/// Inverse of [`sign_message`]: `recover_address(m, &sign_message(m, k)?) == address_of(k)`.
pub fn recover_address(message: &[u8], signature: &Signature) -> Result<Address, CredentialError> {
    signature
        .recover(message.to_vec())
        .map_err(|_| CredentialError::OwnershipProofFailed)
}

/// Parses a 65-byte hex signature (`0x`-prefixed or not).
pub fn parse_signature(raw: &str) -> Result<Signature, CredentialError> {
    raw.trim()
        .parse::<Signature>()
        .map_err(|e| CredentialError::InvalidRequest(format!("malformed signature: {}", e)))
}

/// Ethereum address of a signing key.
pub fn address_of(key: &SigningKey) -> Address {
    ethers::utils::secret_key_to_address(key)
}

/// One-way salted hash of a claim password.
///
/// bcrypt is deliberately slow; callers on the async runtime should run it
/// through `tokio::task::spawn_blocking`.
pub fn hash_password(password: &str, cost: u32) -> Result<String, CredentialError> {
    bcrypt::hash(password, cost)
        .map_err(|e| CredentialError::Internal(format!("password hashing failed: {}", e)))
}

/// Checks a plaintext password against a stored bcrypt hash.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    bcrypt::verify(password, password_hash).unwrap_or(false)
}

/// Random 8-character hex password handed out once at mint time.
pub fn random_password() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    ethers::utils::hex::encode(bytes)
}
