// src/services/verifier.rs
//! Credential chain verification.
//!
//! Starting from a requested credential, the [`Verifier`] walks parent
//! pointers up to a root. Every hop is checked against the ledger
//! (existence, revocation, expiry) and against the claim store (the claim
//! must hash to the anchored `claim_hash`). The first failing hop aborts the
//! whole walk; there is no partial result.
//!
//! Parent pointers are written at mint time and cannot be trusted to be well
//! formed, so the walk is bounded by `max_chain_depth` and keeps a visited set.
//! The engine only reads. Dropping the returned future cancels it without side
//! effects.

use crate::blockchain::registry::Registry;
use crate::config::VerifyConfig;
use crate::error::{CredentialError, LedgerError};
use crate::models::claim::ClaimKey;
use crate::models::credential::{ChainVerificationResult, HopRecord, TokenId};
use crate::models::requests::VerifyCommand;
use crate::services::ownership::OwnershipVerifier;
use crate::storage::claim_store::ClaimStore;
use crate::utils::crypto::content_hash;
use chrono::Utc;
use ethers::types::Address;
use log::{debug, error, info};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Hop bound applied when no configuration overrides it.
pub const MAX_CHAIN_DEPTH: usize = 23;

#[derive(Debug, Clone, Copy)]
pub struct VerifierSettings {
    pub max_chain_depth: usize,
    /// Reject hops whose non-zero `expires_at` lies in the past
    pub enforce_expiry: bool,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            max_chain_depth: MAX_CHAIN_DEPTH,
            enforce_expiry: true,
        }
    }
}

impl From<&VerifyConfig> for VerifierSettings {
    fn from(config: &VerifyConfig) -> Self {
        Self {
            max_chain_depth: config.max_chain_depth,
            enforce_expiry: config.enforce_expiry,
        }
    }
}

/// Verified chain, plus the holder when the caller proved possession.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    #[serde(flatten)]
    pub result: ChainVerificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<Address>,
}

/// Chain verification engine.
///
/// Independent verifications share nothing but the client handles and may
/// run concurrently.
pub struct Verifier {
    registry: Arc<dyn Registry>,
    store: Arc<dyn ClaimStore>,
    settings: VerifierSettings,
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

impl Verifier {
    pub fn new(
        registry: Arc<dyn Registry>,
        store: Arc<dyn ClaimStore>,
        settings: VerifierSettings,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    /// Handles a verification request.
    ///
    /// With a proof of possession attached, ownership is checked first so a
    /// non-owner never causes a claim to be fetched.
    pub async fn verify(
        &self,
        command: &VerifyCommand,
        ownership: &OwnershipVerifier,
    ) -> Result<VerificationReport, CredentialError> {
        let holder = match &command.proof {
            Some(proof) => Some(ownership.prove(command.token_id, proof).await?),
            None => None,
        };
        let result = self
            .verify_chain(command.token_id, command.password.as_deref())
            .await?;
        info!(
            "verified credential {} through {} hop(s){}",
            command.token_id,
            result.len(),
            if holder.is_some() { " with proof of possession" } else { "" }
        );
        Ok(VerificationReport { result, holder })
    }

    /// Verifies the chain headed by `token_id` against the current time.
    ///
    /// `password` is presented for the head claim only. Ancestor claims are
    /// read without one.
    pub async fn verify_chain(
        &self,
        token_id: TokenId,
        password: Option<&str>,
    ) -> Result<ChainVerificationResult, CredentialError> {
        self.verify_chain_at(token_id, password, unix_now()).await
    }

    /// Same as [`verify_chain`](Self::verify_chain) with an explicit clock.
    ///
    /// # Errors
    /// - `NotFound` if the head credential does not exist
    /// - `BrokenChain` if an ancestor does not exist
    /// - `ChainTooLong` / `CycleDetected` for malformed parent pointers
    /// - `Revoked` / `Expired` for a hop that is no longer valid
    /// - `MalformedUri` if a claim URI has no claim key
    /// - `HopFailed` if a claim cannot be read (wrong password, deleted, timeout)
    /// - `IntegrityMismatch` if a claim no longer hashes to its anchored hash
    pub async fn verify_chain_at(
        &self,
        token_id: TokenId,
        password: Option<&str>,
        now: u64,
    ) -> Result<ChainVerificationResult, CredentialError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = token_id;
        let mut hops = 0usize;

        loop {
            if hops >= self.settings.max_chain_depth {
                return Err(CredentialError::ChainTooLong {
                    token_id: current,
                    depth: self.settings.max_chain_depth,
                });
            }
            if !visited.insert(current) {
                return Err(CredentialError::CycleDetected { token_id: current });
            }

            let credential = match self.registry.read_credential(current).await {
                Ok(credential) => credential,
                Err(LedgerError::NotFound(_)) if hops == 0 => {
                    return Err(CredentialError::NotFound(format!("credential {}", current)))
                }
                Err(LedgerError::NotFound(_)) => {
                    return Err(CredentialError::BrokenChain { token_id: current })
                }
                Err(err) => return Err(CredentialError::Ledger(err)),
            };

            if credential.revoked {
                return Err(CredentialError::Revoked { token_id: current });
            }
            if self.settings.enforce_expiry && credential.is_expired_at(now) {
                return Err(CredentialError::Expired {
                    token_id: current,
                    expires_at: credential.expires_at,
                });
            }

            let claim_key = ClaimKey::from_uri(&credential.claim_uri).ok_or_else(|| {
                CredentialError::MalformedUri {
                    token_id: current,
                    uri: credential.claim_uri.clone(),
                }
            })?;

            let hop_password = if hops == 0 { password } else { None };
            let claim = self
                .store
                .get(&claim_key, hop_password)
                .await
                .map_err(|source| CredentialError::HopFailed {
                    token_id: current,
                    source,
                })?;

            let computed = content_hash(&claim)?;
            if computed != credential.claim_hash {
                error!(
                    target: "tamper",
                    "claim of credential {} hashes to {} but the ledger anchors {}",
                    current, computed, credential.claim_hash
                );
                return Err(CredentialError::IntegrityMismatch {
                    token_id: current,
                    expected: credential.claim_hash,
                    computed,
                });
            }

            debug!("hop {}: credential {} verified", hops, current);
            let parent = credential.parent();
            chain.push(HopRecord {
                token_id: current,
                claim,
                claim_uri: credential.claim_uri,
                claim_hash: credential.claim_hash,
                issuer: credential.issuer,
                issuer_token_id: credential.issuer_token_id,
            });

            match parent {
                None => return Ok(ChainVerificationResult { chain }),
                Some(parent) => {
                    current = parent;
                    hops += 1;
                }
            }
        }
    }
}
