// src/blockchain/registry.rs
//! The credential registry as the services see it.
//!
//! Writes (`certify`, `revoke`, `transfer`) return once the transaction is
//! included with the configured number of confirmations. None of them is
//! atomic with claim store writes; the pipelines in
//! [`credential_issuer`](crate::services::credential_issuer) order the two
//! backends explicitly.

use crate::error::LedgerError;
use crate::models::credential::{CertifyRequest, ClaimHash, Credential, TokenId, TxReceipt};
use async_trait::async_trait;
use ethers::types::Address;

#[async_trait]
pub trait Registry: Send + Sync {
    /// Mints `request.token_id` to `request.to`, anchoring the claim URI and hash.
    async fn certify(&self, request: &CertifyRequest) -> Result<TxReceipt, LedgerError>;

    /// Revokes a credential. The record stays readable with `revoked` set.
    async fn revoke(&self, token_id: TokenId) -> Result<TxReceipt, LedgerError>;

    async fn transfer(
        &self,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<TxReceipt, LedgerError>;

    /// Reads the full record, including revocation status.
    async fn read_credential(&self, token_id: TokenId) -> Result<Credential, LedgerError>;

    /// Current holder. Fails with `NotFound` for unknown or revoked tokens.
    async fn owner_of(&self, token_id: TokenId) -> Result<Address, LedgerError>;

    async fn claim_uri(&self, token_id: TokenId) -> Result<String, LedgerError> {
        Ok(self.read_credential(token_id).await?.claim_uri)
    }

    async fn claim_hash(&self, token_id: TokenId) -> Result<ClaimHash, LedgerError> {
        Ok(self.read_credential(token_id).await?.claim_hash)
    }
}
