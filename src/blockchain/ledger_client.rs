// src/blockchain/ledger_client.rs
//! EVM ledger client for the credential registry contract.
//!
//! Provides the [`Registry`] implementation used in production:
//! - transactions are signed locally by the issuing account and sent through
//!   a JSON-RPC provider
//! - writes wait for the configured confirmation depth
//! - every call is bounded by the configured timeout

use crate::blockchain::registry::Registry;
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::models::credential::{CertifyRequest, ClaimHash, Credential, TokenId, TxReceipt};
use crate::wallet::key_management::KeyManager;
use async_trait::async_trait;
use ethers::contract::{abigen, ContractCall, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use log::{debug, info};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

abigen!(
    CredentialNft,
    r#"[
        function certify(address to, uint256 tokenId, string claimURI, bytes32 claimHash, uint256 issuerTokenId, uint64 issuedAt, uint64 expiresAt, bytes optionalData)
        function revoke(uint256 tokenId)
        function transferFrom(address from, address to, uint256 tokenId)
        function ownerOf(uint256 tokenId) view returns (address)
        function credential(uint256 tokenId) view returns (string, bytes32, address, uint256, uint64, uint64, bytes)
        function revoked(uint256 tokenId) view returns (bool)
    ]"#,
);

/// Provider wrapped with the issuing account's local signer.
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Ledger client bound to one deployed credential contract.
#[derive(Clone)]
pub struct LedgerClient {
    contract: CredentialNft<SignerClient>,
    client: Arc<SignerClient>,
    confirmations: usize,
    timeout: Duration,
}

fn write_error(err: ContractError<SignerClient>) -> LedgerError {
    match err {
        ContractError::Revert(data) => {
            LedgerError::Contract(format!("execution reverted: {}", data))
        }
        ContractError::MiddlewareError { e } => LedgerError::Transport(e.to_string()),
        ContractError::ProviderError { e } => LedgerError::Transport(e.to_string()),
        other => LedgerError::Contract(other.to_string()),
    }
}

/// Reads revert for tokens that were never minted (or were burned).
fn read_error(err: ContractError<SignerClient>, token_id: TokenId) -> LedgerError {
    match err {
        ContractError::Revert(_) => LedgerError::NotFound(token_id),
        other => write_error(other),
    }
}

impl LedgerClient {
    /// Connects to the JSON-RPC endpoint and binds the issuing account.
    ///
    /// # Errors
    /// Returns error if:
    /// - the contract address is malformed
    /// - the RPC URL is invalid or the chain id cannot be retrieved
    pub async fn connect(config: &LedgerConfig, keys: &KeyManager) -> Result<Self, LedgerError> {
        let contract_address: Address = config
            .contract_address
            .parse()
            .map_err(|e| {
                LedgerError::Contract(format!(
                    "invalid contract address {}: {}",
                    config.contract_address, e
                ))
            })?;

        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| {
                LedgerError::Transport(format!("invalid RPC URL {}: {}", config.rpc_url, e))
            })?;
        let chain_id = tokio::time::timeout(config.timeout(), provider.get_chainid())
            .await
            .map_err(|_| LedgerError::Timeout)?
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let wallet = LocalWallet::from(keys.signing_key().clone()).with_chain_id(chain_id.as_u64());
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let contract = CredentialNft::new(contract_address, client.clone());

        info!(
            "connected to chain {} as {:?}, registry at {:?}",
            chain_id,
            client.address(),
            contract_address
        );

        Ok(Self {
            contract,
            client,
            confirmations: config.confirmations,
            timeout: config.timeout(),
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LedgerError::Timeout)?
    }

    /// Sends a state-changing call and waits for its receipt.
    async fn submit(
        &self,
        call: ContractCall<SignerClient, ()>,
        action: &str,
    ) -> Result<TxReceipt, LedgerError> {
        let confirmations = self.confirmations;
        let receipt = self
            .bounded(async move {
                let pending = call.send().await.map_err(write_error)?;
                let tx_hash = pending.tx_hash();
                debug!(
                    "{} submitted as {:?}, awaiting {} confirmation(s)",
                    action, tx_hash, confirmations
                );
                pending
                    .confirmations(confirmations)
                    .await
                    .map_err(|e| LedgerError::Transport(e.to_string()))?
                    .ok_or_else(|| LedgerError::Dropped(format!("{:?}", tx_hash)))
            })
            .await?;

        Ok(TxReceipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }
}

#[async_trait]
impl Registry for LedgerClient {
    async fn certify(&self, request: &CertifyRequest) -> Result<TxReceipt, LedgerError> {
        let call = self.contract.certify(
            request.to,
            request.token_id.as_u256(),
            request.claim_uri.clone(),
            request.claim_hash.0,
            request.parent_token_id.as_u256(),
            request.issued_at,
            request.expires_at,
            request.optional_data.clone(),
        );
        self.submit(call, "certify").await
    }

    async fn revoke(&self, token_id: TokenId) -> Result<TxReceipt, LedgerError> {
        let call = self.contract.revoke(token_id.as_u256());
        self.submit(call, "revoke").await
    }

    async fn transfer(
        &self,
        from: Address,
        to: Address,
        token_id: TokenId,
    ) -> Result<TxReceipt, LedgerError> {
        let call = self.contract.transfer_from(from, to, token_id.as_u256());
        self.submit(call, "transferFrom").await
    }

    async fn read_credential(&self, token_id: TokenId) -> Result<Credential, LedgerError> {
        let id = token_id.as_u256();
        let (claim_uri, claim_hash, issuer, issuer_token_id, issued_at, expires_at, optional_data) =
            self.bounded(async {
                self.contract
                    .credential(id)
                    .call()
                    .await
                    .map_err(|e| read_error(e, token_id))
            })
            .await?;

        // Unminted slots read back as the zero record
        if claim_uri.is_empty() {
            return Err(LedgerError::NotFound(token_id));
        }

        let revoked = self
            .bounded(async {
                self.contract
                    .revoked(id)
                    .call()
                    .await
                    .map_err(|e| read_error(e, token_id))
            })
            .await?;

        Ok(Credential {
            id: token_id,
            claim_uri,
            claim_hash: ClaimHash(claim_hash),
            issuer,
            issuer_token_id: TokenId(issuer_token_id),
            issued_at,
            expires_at,
            optional_data,
            revoked,
        })
    }

    async fn owner_of(&self, token_id: TokenId) -> Result<Address, LedgerError> {
        self.bounded(async {
            self.contract
                .owner_of(token_id.as_u256())
                .call()
                .await
                .map_err(|e| read_error(e, token_id))
        })
        .await
    }
}
