// src/testing.rs
//! In-memory registry and claim store used by the service and router tests.

use crate::blockchain::registry::Registry;
use crate::error::{LedgerError, StoreError};
use crate::models::claim::{self, ClaimKey, StoredClaim};
use crate::models::credential::{CertifyRequest, ClaimHash, Credential, TokenId, TxReceipt};
use crate::storage::claim_store::ClaimStore;
use crate::utils::crypto::{content_hash, hash_data, verify_password};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Account that the in-memory registry reports as issuer of every credential.
pub fn issuer_address() -> Address {
    Address::repeat_byte(0x11)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct LedgerState {
    credentials: HashMap<TokenId, Credential>,
    owners: HashMap<TokenId, Address>,
    fail_certify: Option<LedgerError>,
    fail_revoke: Option<LedgerError>,
    transactions: u64,
}

impl LedgerState {
    fn receipt(&mut self) -> TxReceipt {
        self.transactions += 1;
        TxReceipt {
            transaction_hash: H256(hash_data(&self.transactions.to_be_bytes())),
            block_number: Some(self.transactions),
        }
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<LedgerState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a record directly, bypassing `certify` checks. Used to build
    /// adversarial ledger states such as cycles.
    pub fn insert_raw(&self, credential: Credential, owner: Address) {
        let mut state = lock(&self.state);
        state.owners.insert(credential.id, owner);
        state.credentials.insert(credential.id, credential);
    }

    pub fn fail_next_certify(&self, err: LedgerError) {
        lock(&self.state).fail_certify = Some(err);
    }

    pub fn fail_next_revoke(&self, err: LedgerError) {
        lock(&self.state).fail_revoke = Some(err);
    }

    pub fn get(&self, token_id: TokenId) -> Option<Credential> {
        lock(&self.state).credentials.get(&token_id).cloned()
    }

    pub fn contains(&self, token_id: TokenId) -> bool {
        lock(&self.state).credentials.contains_key(&token_id)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn certify(&self, request: &CertifyRequest) -> Result<TxReceipt, LedgerError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_certify.take() {
            return Err(err);
        }
        if state.credentials.contains_key(&request.token_id) {
            return Err(LedgerError::Contract("token already minted".to_string()));
        }
        state.credentials.insert(
            request.token_id,
            Credential {
                id: request.token_id,
                claim_uri: request.claim_uri.clone(),
                claim_hash: request.claim_hash,
                issuer: issuer_address(),
                issuer_token_id: request.parent_token_id,
                issued_at: request.issued_at,
                expires_at: request.expires_at,
                optional_data: request.optional_data.clone(),
                revoked: false,
            },
        );
        state.owners.insert(request.token_id, request.to);
        Ok(state.receipt())
    }

    async fn revoke(&self, token_id: TokenId) -> Result<TxReceipt, LedgerError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_revoke.take() {
            return Err(err);
        }
        match state.credentials.get_mut(&token_id) {
            Some(credential) if !credential.revoked => credential.revoked = true,
            Some(_) => return Err(LedgerError::Contract("already revoked".to_string())),
            None => return Err(LedgerError::NotFound(token_id)),
        }
        state.owners.remove(&token_id);
        Ok(state.receipt())
    }

    async fn transfer(
        &self,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<TxReceipt, LedgerError> {
        let mut state = lock(&self.state);
        match state.owners.get(&token_id) {
            Some(owner) if *owner == from => {}
            Some(_) => {
                return Err(LedgerError::Contract(
                    "transfer from incorrect owner".to_string(),
                ))
            }
            None => return Err(LedgerError::NotFound(token_id)),
        }
        state.owners.insert(token_id, to);
        Ok(state.receipt())
    }

    async fn read_credential(&self, token_id: TokenId) -> Result<Credential, LedgerError> {
        self.get(token_id).ok_or(LedgerError::NotFound(token_id))
    }

    async fn owner_of(&self, token_id: TokenId) -> Result<Address, LedgerError> {
        lock(&self.state)
            .owners
            .get(&token_id)
            .copied()
            .ok_or(LedgerError::NotFound(token_id))
    }
}

struct StoredEntry {
    record: StoredClaim,
    deleted: bool,
}

pub struct MemoryClaimStore {
    base_url: Url,
    entries: Mutex<HashMap<ClaimKey, StoredEntry>>,
    forced_conflicts: Mutex<u32>,
    fail_deletes: Mutex<Option<StoreError>>,
}

impl Default for MemoryClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self {
            base_url: Url::parse("http://claims.test").unwrap(),
            entries: Mutex::new(HashMap::new()),
            forced_conflicts: Mutex::new(0),
            fail_deletes: Mutex::new(None),
        }
    }

    /// Makes the next `count` writes fail with a key conflict.
    pub fn force_conflicts(&self, count: u32) {
        *lock(&self.forced_conflicts) = count;
    }

    pub fn fail_next_delete(&self, err: StoreError) {
        *lock(&self.fail_deletes) = Some(err);
    }

    /// Overwrites a stored payload in place, as a compromised store would.
    pub fn tamper(&self, key: &ClaimKey, claim: Value) {
        if let Some(entry) = lock(&self.entries).get_mut(key) {
            entry.record.claim = claim;
        }
    }

    /// Whether a live (not soft-deleted) claim exists under `key`.
    pub fn contains(&self, key: &ClaimKey) -> bool {
        lock(&self.entries).get(key).map(|e| !e.deleted).unwrap_or(false)
    }

    pub fn record(&self, key: &ClaimKey) -> Option<StoredClaim> {
        lock(&self.entries).get(key).map(|e| e.record.clone())
    }

    pub fn live_count(&self) -> usize {
        lock(&self.entries).values().filter(|e| !e.deleted).count()
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn put(&self, claim: &StoredClaim) -> Result<(), StoreError> {
        {
            let mut forced = lock(&self.forced_conflicts);
            if *forced > 0 {
                *forced -= 1;
                return Err(StoreError::Conflict);
            }
        }
        let mut entries = lock(&self.entries);
        if entries.contains_key(&claim.claim_key) {
            return Err(StoreError::Conflict);
        }
        entries.insert(
            claim.claim_key.clone(),
            StoredEntry {
                record: claim.clone(),
                deleted: false,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &ClaimKey, password: Option<&str>) -> Result<Value, StoreError> {
        let entries = lock(&self.entries);
        let entry = entries.get(key).filter(|e| !e.deleted).ok_or(StoreError::NotFound)?;
        if let Some(hash) = &entry.record.password_hash {
            match password {
                Some(password) if verify_password(password, hash) => {}
                _ => return Err(StoreError::Unauthorized),
            }
        }
        Ok(entry.record.claim.clone())
    }

    async fn soft_delete(&self, _token_id: TokenId, key: &ClaimKey) -> Result<(), StoreError> {
        if let Some(err) = lock(&self.fail_deletes).take() {
            return Err(err);
        }
        match lock(&self.entries).get_mut(key) {
            Some(entry) if !entry.deleted => {
                entry.deleted = true;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    fn claim_uri(&self, key: &ClaimKey) -> String {
        claim::claim_uri(&self.base_url, key)
    }
}

/// Writes a claim and its credential straight into the doubles.
///
/// Returns the claim key so tests can tamper with or inspect the claim.
pub async fn anchor(
    registry: &MemoryRegistry,
    store: &MemoryClaimStore,
    token_id: u64,
    parent: u64,
    claim: Value,
    owner: Address,
) -> ClaimKey {
    let key = ClaimKey::generate();
    let claim_hash: ClaimHash = content_hash(&claim).unwrap();
    store
        .put(&StoredClaim {
            claim,
            password_hash: None,
            claim_key: key.clone(),
        })
        .await
        .unwrap();
    registry.insert_raw(
        Credential {
            id: TokenId::from(token_id),
            claim_uri: store.claim_uri(&key),
            claim_hash,
            issuer: issuer_address(),
            issuer_token_id: TokenId::from(parent),
            issued_at: 1_700_000_000,
            expires_at: 0,
            optional_data: Bytes::default(),
            revoked: false,
        },
        owner,
    );
    key
}
