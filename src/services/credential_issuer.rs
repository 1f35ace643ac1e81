// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Orchestrates every write that touches both backends:
//! - Upload: store a claim ahead of minting
//! - Mint: store the claim, then anchor its hash on the ledger with `certify`
//! - Revoke: revoke on the ledger, then soft-delete the claim
//! - Transfer and registry read passthroughs
//!
//! The ledger and the claim store share no transaction. Mint and revoke are
//! ordered sagas and their partial states are returned to the caller as
//! first-class outcomes:
//! - a mint whose ledger write fails after the claim was stored returns
//!   [`CredentialError::OrphanedClaim`] and logs under the `orphan` target
//! - a revoke whose claim cleanup fails still succeeds, with
//!   [`ClaimCleanup::Failed`] in the outcome

use crate::blockchain::registry::Registry;
use crate::config::ClaimStoreConfig;
use crate::error::{CredentialError, LedgerError, StoreError};
use crate::models::claim::{ClaimKey, StoredClaim};
use crate::models::credential::{CertifyRequest, ClaimHash, Credential, TokenId, TxReceipt};
use crate::models::requests::{
    ClaimSource, Lineage, MintCommand, PasswordPolicy, TransferCommand, UploadCommand,
};
use crate::storage::claim_store::ClaimStore;
use crate::utils::crypto::{content_hash, hash_password, random_password};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Tunables of the write pipelines.
#[derive(Debug, Clone, Copy)]
pub struct IssuerSettings {
    /// bcrypt cost for claim passwords
    pub bcrypt_cost: u32,
    /// Total attempts at storing a claim under a fresh key
    pub put_retries: u32,
}

impl From<&ClaimStoreConfig> for IssuerSettings {
    fn from(config: &ClaimStoreConfig) -> Self {
        Self {
            bcrypt_cost: config.bcrypt_cost,
            put_retries: config.put_retries,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    #[serde(rename = "uri")]
    pub claim_uri: String,
    pub claim_hash: ClaimHash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub token_id: TokenId,
    #[serde(flatten)]
    pub receipt: TxReceipt,
    pub claim_hash: ClaimHash,
    #[serde(rename = "claimURI")]
    pub claim_uri: String,
    /// Only set for generated passwords; shown once and never stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// What happened to the off-chain claim after a revocation landed.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ClaimCleanup {
    Deleted,
    /// The claim was already deleted or never existed
    AlreadyGone,
    /// The credential's URI names no claim key, nothing to delete
    Skipped,
    /// The claim stays readable; the ledger revocation is still authoritative
    Failed { reason: String },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevokeOutcome {
    pub token_id: TokenId,
    #[serde(flatten)]
    pub receipt: TxReceipt,
    pub claim_cleanup: ClaimCleanup,
}

/// Service for issuing, revoking and transferring credentials.
pub struct CredentialIssuer {
    registry: Arc<dyn Registry>,
    store: Arc<dyn ClaimStore>,
    settings: IssuerSettings,
}

impl CredentialIssuer {
    /// Creates a new CredentialIssuer instance
    ///
    /// # Arguments
    /// * `registry` - Ledger the credentials are anchored on
    /// * `store` - Claim store holding the claim payloads
    /// * `settings` - Password hashing cost and key collision retries
    pub fn new(
        registry: Arc<dyn Registry>,
        store: Arc<dyn ClaimStore>,
        settings: IssuerSettings,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    async fn hash_password(&self, password: &str) -> Result<String, CredentialError> {
        let password = password.to_string();
        let cost = self.settings.bcrypt_cost;
        tokio::task::spawn_blocking(move || hash_password(&password, cost))
            .await
            .map_err(|e| CredentialError::Internal(format!("password hashing task failed: {}", e)))?
    }

    /// Writes `claim` under a freshly generated key, retrying key collisions.
    ///
    /// # Returns
    /// The key the claim was stored under
    async fn store_claim(
        &self,
        claim: &Value,
        password_hash: Option<String>,
    ) -> Result<ClaimKey, CredentialError> {
        let attempts = self.settings.put_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let record = StoredClaim {
                claim: claim.clone(),
                password_hash: password_hash.clone(),
                claim_key: ClaimKey::generate(),
            };
            match self.store.put(&record).await {
                Ok(()) => return Ok(record.claim_key),
                Err(StoreError::Conflict) if attempt < attempts => {
                    warn!(
                        "claim key collision, retrying with a fresh key ({}/{})",
                        attempt, attempts
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Stores a claim ahead of minting.
    ///
    /// The returned URI can be passed to [`mint`](Self::mint) as `uri`.
    pub async fn upload(&self, command: UploadCommand) -> Result<UploadOutcome, CredentialError> {
        let claim_hash = content_hash(&command.claim)?;
        let password_hash = match &command.password {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };
        let key = self.store_claim(&command.claim, password_hash).await?;
        let claim_uri = self.store.claim_uri(&key);
        info!("uploaded claim {} with hash {}", key, claim_hash);

        Ok(UploadOutcome {
            claim_uri,
            claim_hash,
            password: command.password,
        })
    }

    /// Mints a credential.
    ///
    /// Inline claims are stored first and anchored second. Uploaded claims are
    /// read back (with the supplied password) so their hash is computed from
    /// what the store actually holds.
    ///
    /// # Errors
    /// - `InvalidRequest` if the parent does not exist or is revoked
    /// - `OrphanedClaim` if the claim was stored but `certify` failed; the
    ///   claim stays in the store under the reported key
    /// - `Ledger` / `Store` for backend failures before any write landed
    pub async fn mint(&self, command: MintCommand) -> Result<MintOutcome, CredentialError> {
        if let Lineage::Child { parent } = command.lineage {
            self.check_parent(parent).await?;
        }

        let (stored_key, claim_uri, claim_hash, password) = match command.source {
            ClaimSource::Inline(claim) => {
                let claim_hash = content_hash(&claim)?;
                let (password, generated) = match command.password {
                    PasswordPolicy::None => (None, false),
                    PasswordPolicy::Supplied(password) => (Some(password), false),
                    PasswordPolicy::Generated => (Some(random_password()), true),
                };
                let password_hash = match &password {
                    Some(password) => Some(self.hash_password(password).await?),
                    None => None,
                };
                let key = self.store_claim(&claim, password_hash).await?;
                let claim_uri = self.store.claim_uri(&key);
                (Some(key), claim_uri, claim_hash, password.filter(|_| generated))
            }
            ClaimSource::Uploaded { uri } => {
                let key = ClaimKey::from_uri(&uri).ok_or_else(|| {
                    CredentialError::InvalidRequest(format!("`uri` carries no claim key: {}", uri))
                })?;
                let password = match &command.password {
                    PasswordPolicy::Supplied(password) => Some(password.as_str()),
                    _ => None,
                };
                let claim = self.store.get(&key, password).await?;
                (None, self.store.claim_uri(&key), content_hash(&claim)?, None)
            }
        };

        let request = CertifyRequest {
            to: command.to,
            token_id: command.token_id,
            claim_uri: claim_uri.clone(),
            claim_hash,
            parent_token_id: command.lineage.parent_token_id(),
            issued_at: command.issued_at,
            expires_at: command.expires_at,
            optional_data: command.optional_data,
        };

        let receipt = match self.registry.certify(&request).await {
            Ok(receipt) => receipt,
            Err(source) => {
                return Err(match stored_key {
                    Some(claim_key) => {
                        warn!(
                            target: "orphan",
                            "claim {} was stored for credential {} but certify failed: {}",
                            claim_key, command.token_id, source
                        );
                        CredentialError::OrphanedClaim {
                            token_id: command.token_id,
                            claim_key,
                            source,
                        }
                    }
                    None => source.into(),
                })
            }
        };

        info!(
            "minted credential {} to {:?} (parent {}) in tx {:?}",
            command.token_id,
            command.to,
            request.parent_token_id,
            receipt.transaction_hash
        );

        Ok(MintOutcome {
            token_id: command.token_id,
            receipt,
            claim_hash,
            claim_uri,
            password,
        })
    }

    async fn check_parent(&self, parent: TokenId) -> Result<(), CredentialError> {
        match self.registry.read_credential(parent).await {
            Ok(credential) if credential.revoked => Err(CredentialError::InvalidRequest(format!(
                "parent credential {} has been revoked",
                parent
            ))),
            Ok(_) => Ok(()),
            Err(LedgerError::NotFound(_)) => Err(CredentialError::InvalidRequest(format!(
                "parent credential {} does not exist",
                parent
            ))),
            Err(err) => Err(err.into()),
        }
    }

    /// Revokes a credential on the ledger, then soft-deletes its claim.
    ///
    /// The ledger write is authoritative. If it fails nothing is deleted; if
    /// the cleanup fails the revocation still stands and the outcome says so.
    pub async fn revoke(&self, token_id: TokenId) -> Result<RevokeOutcome, CredentialError> {
        let credential = self.registry.read_credential(token_id).await?;
        if credential.revoked {
            return Err(CredentialError::Revoked { token_id });
        }

        let receipt = self.registry.revoke(token_id).await?;
        info!("revoked credential {} in tx {:?}", token_id, receipt.transaction_hash);

        let claim_cleanup = match ClaimKey::from_uri(&credential.claim_uri) {
            None => ClaimCleanup::Skipped,
            Some(key) => self.delete_claim(token_id, &key).await,
        };

        Ok(RevokeOutcome {
            token_id,
            receipt,
            claim_cleanup,
        })
    }

    /// Soft-deletes the claim of a revoked credential.
    ///
    /// A 404 from the delete only counts as `AlreadyGone` once a read of the
    /// key also comes back 404.
    async fn delete_claim(&self, token_id: TokenId, key: &ClaimKey) -> ClaimCleanup {
        let err = match self.store.soft_delete(token_id, key).await {
            Ok(()) => return ClaimCleanup::Deleted,
            Err(StoreError::NotFound) => match self.store.get(key, None).await {
                Err(StoreError::NotFound) => return ClaimCleanup::AlreadyGone,
                Ok(_) | Err(StoreError::Unauthorized) => {
                    StoreError::Unexpected {
                        status: 404,
                        body: "delete missed a claim that is still stored".to_string(),
                    }
                }
                Err(err) => err,
            },
            Err(err) => err,
        };
        warn!(
            "credential {} is revoked but claim {} could not be deleted: {}",
            token_id, key, err
        );
        ClaimCleanup::Failed { reason: err.to_string() }
    }

    pub async fn transfer(&self, command: TransferCommand) -> Result<TxReceipt, CredentialError> {
        let receipt = self
            .registry
            .transfer(command.from, command.to, command.token_id)
            .await?;
        info!(
            "transferred credential {} from {:?} to {:?} in tx {:?}",
            command.token_id, command.from, command.to, receipt.transaction_hash
        );
        Ok(receipt)
    }

    pub async fn credential(&self, token_id: TokenId) -> Result<Credential, CredentialError> {
        Ok(self.registry.read_credential(token_id).await?)
    }

    pub async fn claim_uri(&self, token_id: TokenId) -> Result<String, CredentialError> {
        Ok(self.registry.claim_uri(token_id).await?)
    }

    pub async fn claim_hash(&self, token_id: TokenId) -> Result<ClaimHash, CredentialError> {
        Ok(self.registry.claim_hash(token_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryClaimStore, MemoryRegistry};
    use ethers::types::{Address, Bytes};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn holder() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn issuer() -> (CredentialIssuer, Arc<MemoryRegistry>, Arc<MemoryClaimStore>) {
        let registry = Arc::new(MemoryRegistry::new());
        let store = Arc::new(MemoryClaimStore::new());
        let issuer = CredentialIssuer::new(
            registry.clone(),
            store.clone(),
            IssuerSettings {
                bcrypt_cost: 4,
                put_retries: 3,
            },
        );
        (issuer, registry, store)
    }

    fn mint_command(token_id: u64, claim: Value) -> MintCommand {
        MintCommand {
            token_id: TokenId::from(token_id),
            to: holder(),
            source: ClaimSource::Inline(claim),
            lineage: Lineage::Root,
            password: PasswordPolicy::None,
            issued_at: 1_700_000_000,
            expires_at: 0,
            optional_data: Bytes::default(),
        }
    }

    #[tokio::test]
    async fn mint_stores_claim_then_anchors_its_hash() {
        let (issuer, registry, store) = issuer();
        let outcome = assert_ok!(issuer.mint(mint_command(1, json!({"a": 1}))).await);

        assert_eq!(outcome.claim_hash, content_hash(&json!({"a": 1})).unwrap());
        let credential = registry.get(TokenId::from(1u64)).unwrap();
        assert_eq!(credential.claim_hash, outcome.claim_hash);
        assert_eq!(credential.claim_uri, outcome.claim_uri);
        assert!(credential.is_root());

        let key = ClaimKey::from_uri(&outcome.claim_uri).unwrap();
        assert_eq!(store.get(&key, None).await.unwrap(), json!({"a": 1}));
        assert!(outcome.password.is_none());
    }

    #[tokio::test]
    async fn mint_hashes_supplied_password() {
        let (issuer, _, store) = issuer();
        let mut command = mint_command(2, json!({"degree": "BSc"}));
        command.password = PasswordPolicy::Supplied("p1".to_string());
        let outcome = issuer.mint(command).await.unwrap();

        let key = ClaimKey::from_uri(&outcome.claim_uri).unwrap();
        let record = store.record(&key).unwrap();
        let stored_hash = record.password_hash.unwrap();
        assert_ne!(stored_hash, "p1");
        assert!(outcome.password.is_none());
        assert_eq!(store.get(&key, Some("wrong")).await, Err(StoreError::Unauthorized));
        assert!(store.get(&key, Some("p1")).await.is_ok());
    }

    #[tokio::test]
    async fn mint_returns_generated_password_once() {
        let (issuer, _, store) = issuer();
        let mut command = mint_command(3, json!({"x": true}));
        command.password = PasswordPolicy::Generated;
        let outcome = issuer.mint(command).await.unwrap();

        let password = outcome.password.expect("generated password");
        assert_eq!(password.len(), 8);
        let key = ClaimKey::from_uri(&outcome.claim_uri).unwrap();
        assert!(store.get(&key, Some(&password)).await.is_ok());
    }

    #[tokio::test]
    async fn mint_retries_key_collisions() {
        let (issuer, _, store) = issuer();
        store.force_conflicts(2);
        assert_ok!(issuer.mint(mint_command(4, json!({"n": 4}))).await);
        assert_eq!(store.live_count(), 1);
    }

    #[tokio::test]
    async fn mint_gives_up_after_bounded_collisions() {
        let (issuer, registry, store) = issuer();
        store.force_conflicts(3);
        let err = assert_err!(issuer.mint(mint_command(5, json!({"n": 5}))).await);
        assert!(matches!(err, CredentialError::Conflict));
        assert!(!registry.contains(TokenId::from(5u64)));
    }

    #[tokio::test]
    async fn failed_certify_reports_orphaned_claim() {
        let (issuer, registry, store) = issuer();
        registry.fail_next_certify(LedgerError::Timeout);

        let err = issuer.mint(mint_command(6, json!({"o": 1}))).await.unwrap_err();
        let claim_key = match err {
            CredentialError::OrphanedClaim {
                token_id,
                claim_key,
                source,
            } => {
                assert_eq!(token_id, TokenId::from(6u64));
                assert_eq!(source, LedgerError::Timeout);
                claim_key
            }
            other => panic!("expected orphaned claim, got {:?}", other),
        };

        assert!(!registry.contains(TokenId::from(6u64)));
        assert!(store.contains(&claim_key));
        assert_eq!(store.get(&claim_key, None).await.unwrap(), json!({"o": 1}));
    }

    #[tokio::test]
    async fn mint_child_requires_live_parent() {
        let (issuer, registry, _) = issuer();
        let mut command = mint_command(8, json!({"child": true}));
        command.lineage = Lineage::Child {
            parent: TokenId::from(7u64),
        };
        let err = issuer.mint(command.clone()).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidRequest");

        issuer.mint(mint_command(7, json!({"root": true}))).await.unwrap();
        issuer.mint(command).await.unwrap();
        assert_eq!(
            registry.get(TokenId::from(8u64)).unwrap().parent(),
            Some(TokenId::from(7u64))
        );
    }

    #[tokio::test]
    async fn mint_from_uploaded_uri_skips_store_write() {
        let (issuer, registry, store) = issuer();
        let uploaded = issuer
            .upload(UploadCommand {
                claim: json!({"pre": "stored"}),
                password: Some("s3cret".to_string()),
            })
            .await
            .unwrap();

        let mut command = mint_command(9, Value::Null);
        command.source = ClaimSource::Uploaded {
            uri: uploaded.claim_uri.clone(),
        };
        command.password = PasswordPolicy::Supplied("s3cret".to_string());
        let outcome = issuer.mint(command).await.unwrap();

        assert_eq!(outcome.claim_hash, uploaded.claim_hash);
        assert_eq!(outcome.claim_uri, uploaded.claim_uri);
        assert_eq!(store.live_count(), 1);
        assert!(registry.contains(TokenId::from(9u64)));
    }

    #[tokio::test]
    async fn revoke_deletes_claim_after_ledger_write() {
        let (issuer, registry, store) = issuer();
        let minted = issuer.mint(mint_command(10, json!({"r": 1}))).await.unwrap();
        let key = ClaimKey::from_uri(&minted.claim_uri).unwrap();

        let outcome = issuer.revoke(TokenId::from(10u64)).await.unwrap();
        assert_eq!(outcome.claim_cleanup, ClaimCleanup::Deleted);
        assert!(registry.get(TokenId::from(10u64)).unwrap().revoked);
        assert!(!store.contains(&key));

        let again = issuer.revoke(TokenId::from(10u64)).await.unwrap_err();
        assert_eq!(again.kind(), "Revoked");
    }

    #[tokio::test]
    async fn failed_ledger_revoke_leaves_claim_alone() {
        let (issuer, registry, store) = issuer();
        let minted = issuer.mint(mint_command(11, json!({"r": 2}))).await.unwrap();
        let key = ClaimKey::from_uri(&minted.claim_uri).unwrap();

        registry.fail_next_revoke(LedgerError::Transport("connection reset".into()));
        let err = issuer.revoke(TokenId::from(11u64)).await.unwrap_err();
        assert!(err.is_transient());
        assert!(store.contains(&key));
        assert!(!registry.get(TokenId::from(11u64)).unwrap().revoked);
    }

    #[tokio::test]
    async fn failed_cleanup_is_reported_not_raised() {
        let (issuer, registry, store) = issuer();
        issuer.mint(mint_command(12, json!({"r": 3}))).await.unwrap();
        store.fail_next_delete(StoreError::Timeout);

        let outcome = issuer.revoke(TokenId::from(12u64)).await.unwrap();
        assert!(matches!(outcome.claim_cleanup, ClaimCleanup::Failed { .. }));
        assert!(registry.get(TokenId::from(12u64)).unwrap().revoked);
    }

    #[tokio::test]
    async fn delete_miss_on_live_claim_is_a_failed_cleanup() {
        let (issuer, _, store) = issuer();
        let minted = issuer.mint(mint_command(14, json!({"r": 4}))).await.unwrap();
        let key = ClaimKey::from_uri(&minted.claim_uri).unwrap();
        store.fail_next_delete(StoreError::NotFound);

        let outcome = issuer.revoke(TokenId::from(14u64)).await.unwrap();
        assert!(matches!(outcome.claim_cleanup, ClaimCleanup::Failed { .. }));
        assert!(store.contains(&key));
    }

    #[tokio::test]
    async fn delete_of_missing_claim_is_already_gone() {
        let (issuer, _, store) = issuer();
        let minted = issuer.mint(mint_command(15, json!({"r": 5}))).await.unwrap();
        let key = ClaimKey::from_uri(&minted.claim_uri).unwrap();
        store.soft_delete(TokenId::from(15u64), &key).await.unwrap();

        let outcome = issuer.revoke(TokenId::from(15u64)).await.unwrap();
        assert_eq!(outcome.claim_cleanup, ClaimCleanup::AlreadyGone);
    }

    #[tokio::test]
    async fn transfer_moves_ownership() {
        let (issuer, registry, _) = issuer();
        issuer.mint(mint_command(13, json!({"t": 1}))).await.unwrap();
        let new_holder = Address::repeat_byte(0xbb);

        issuer
            .transfer(TransferCommand {
                from: holder(),
                to: new_holder,
                token_id: TokenId::from(13u64),
            })
            .await
            .unwrap();
        assert_eq!(registry.owner_of(TokenId::from(13u64)).await.unwrap(), new_holder);
    }

    #[tokio::test]
    async fn read_passthroughs_surface_not_found() {
        let (issuer, _, _) = issuer();
        let minted = issuer.mint(mint_command(14, json!({"p": 1}))).await.unwrap();

        assert_eq!(issuer.claim_uri(TokenId::from(14u64)).await.unwrap(), minted.claim_uri);
        assert_eq!(issuer.claim_hash(TokenId::from(14u64)).await.unwrap(), minted.claim_hash);
        let err = issuer.credential(TokenId::from(99u64)).await.unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }
}
