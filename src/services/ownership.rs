// src/services/ownership.rs
//! Proof of possession for credential holders.
//!
//! A holder proves control of the address that owns a credential by signing a
//! server-chosen challenge with `personal_sign`:
//!
//! 1. `issue_challenge(token_id)` returns a random message bound to that token
//! 2. the holder signs the message with their wallet
//! 3. `prove(token_id, proof)` consumes the challenge, recovers the signer and
//!    compares it with the ledger's `ownerOf(token_id)`
//!
//! Challenges expire after the configured TTL and are consumed by the first
//! proof attempt whether it succeeds or not, so a captured signature cannot be
//! replayed. At most `max_pending` unexpired challenges are held overall and
//! at most [`MAX_PENDING_PER_TOKEN`] for any one credential.

use crate::blockchain::registry::Registry;
use crate::error::CredentialError;
use crate::models::credential::TokenId;
use crate::models::requests::ProofOfPossession;
use crate::utils::crypto::{parse_signature, recover_address};
use chrono::Utc;
use ethers::types::Address;
use ethers::utils::hex;
use log::{debug, warn};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Random bytes in a challenge nonce.
pub const CHALLENGE_BYTES: usize = 32;

/// Unexpired challenges allowed for a single credential.
pub const MAX_PENDING_PER_TOKEN: usize = 8;

/// A challenge as handed to the holder.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub challenge_id: String,
    pub token_id: TokenId,
    /// Exact text the holder must sign
    pub message: String,
    /// Unix seconds
    pub expires_at: u64,
}

struct PendingChallenge {
    token_id: TokenId,
    message: String,
    deadline: Instant,
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Outstanding one-shot challenges, keyed by challenge id.
pub struct ChallengeRegistry {
    ttl: Duration,
    max_pending: usize,
    pending: Mutex<HashMap<String, PendingChallenge>>,
}

impl ChallengeRegistry {
    pub fn new(ttl: Duration, max_pending: usize) -> Self {
        Self {
            ttl,
            max_pending,
            pending: Mutex::new(HashMap::new()),
        }
    }

    // Entries are plain data, so a panic elsewhere cannot leave them half-written.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingChallenge>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a challenge for `token_id`, dropping expired ones on the way.
    ///
    /// # Errors
    /// `TooManyChallenges` if either the overall or the per-credential limit
    /// is reached.
    pub fn issue(&self, token_id: TokenId) -> Result<Challenge, CredentialError> {
        let now = Instant::now();
        let mut pending = self.lock();
        pending.retain(|_, challenge| challenge.deadline > now);
        if pending.len() >= self.max_pending {
            return Err(CredentialError::TooManyChallenges);
        }
        let for_token = pending.values().filter(|c| c.token_id == token_id).count();
        if for_token >= MAX_PENDING_PER_TOKEN {
            return Err(CredentialError::TooManyChallenges);
        }

        let challenge_id = random_hex(16);
        let message = format!(
            "Prove ownership of credential {}\nChallenge: {}",
            token_id,
            random_hex(CHALLENGE_BYTES)
        );
        let expires_at = u64::try_from(Utc::now().timestamp()).unwrap_or(0) + self.ttl.as_secs();
        pending.insert(
            challenge_id.clone(),
            PendingChallenge {
                token_id,
                message: message.clone(),
                deadline: now + self.ttl,
            },
        );

        Ok(Challenge {
            challenge_id,
            token_id,
            message,
            expires_at,
        })
    }

    /// Removes the challenge and returns its message if it is still valid for `token_id`.
    pub fn take(&self, challenge_id: &str, token_id: TokenId) -> Result<String, CredentialError> {
        let challenge = self
            .lock()
            .remove(challenge_id)
            .ok_or(CredentialError::ChallengeUnknown)?;
        if challenge.deadline <= Instant::now() || challenge.token_id != token_id {
            return Err(CredentialError::ChallengeUnknown);
        }
        Ok(challenge.message)
    }

    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }
}

/// Checks signatures over issued challenges against the ledger owner.
pub struct OwnershipVerifier {
    registry: Arc<dyn Registry>,
    challenges: ChallengeRegistry,
}

impl OwnershipVerifier {
    pub fn new(registry: Arc<dyn Registry>, challenges: ChallengeRegistry) -> Self {
        Self { registry, challenges }
    }

    /// Issues a challenge for an existing, unrevoked credential.
    pub async fn issue_challenge(&self, token_id: TokenId) -> Result<Challenge, CredentialError> {
        self.registry.owner_of(token_id).await?;
        let challenge = self.challenges.issue(token_id)?;
        debug!(
            "issued challenge {} for credential {} ({} outstanding)",
            challenge.challenge_id,
            token_id,
            self.challenges.outstanding()
        );
        Ok(challenge)
    }

    /// Verifies a proof of possession.
    ///
    /// # Returns
    /// The owner address the signature recovered to
    ///
    /// # Errors
    /// - `ChallengeUnknown` if the challenge was never issued, expired, was
    ///   already used or belongs to another credential
    /// - `InvalidRequest` if the signature is not 65 hex-encoded bytes
    /// - `OwnershipProofFailed` if the signer is not the current owner
    pub async fn prove(
        &self,
        token_id: TokenId,
        proof: &ProofOfPossession,
    ) -> Result<Address, CredentialError> {
        let message = self.challenges.take(&proof.challenge_id, token_id)?;
        let signature = parse_signature(&proof.signature)?;
        let recovered = recover_address(message.as_bytes(), &signature)?;
        let owner = self.registry.owner_of(token_id).await?;

        if recovered != owner {
            warn!(
                "ownership proof for credential {} signed by {:?}, owner is {:?}",
                token_id, recovered, owner
            );
            return Err(CredentialError::OwnershipProofFailed);
        }
        Ok(owner)
    }
}
