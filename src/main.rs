// src/main.rs

//! # Credential Chain - Main Entry Point
//!
//! Loads configuration, connects both backends and starts the API server.
//!
//! ## Configuration
//! Values come from built-in defaults, an optional `credential-chain.toml`
//! and `CCS_*` environment variables (a `.env` file is loaded first).
//! Required:
//! - `CCS_LEDGER__CONTRACT_ADDRESS`: deployed credential registry contract
//! - `CCS_LEDGER__PRIVATE_KEY`: issuing account key
//!
//! Logging is controlled by `RUST_LOG` (default `info`). Orphaned claims are
//! logged under the `orphan` target and integrity failures under `tamper`.

use anyhow::Context;
use credential_chain::blockchain::ledger_client::LedgerClient;
use credential_chain::config::AppConfig;
use credential_chain::services::api_server::ApiServer;
use credential_chain::services::credential_issuer::{CredentialIssuer, IssuerSettings};
use credential_chain::services::ownership::{ChallengeRegistry, OwnershipVerifier};
use credential_chain::services::verifier::{Verifier, VerifierSettings};
use credential_chain::storage::claim_store::HttpClaimStore;
use credential_chain::wallet::key_management::KeyManager;
use dotenv::dotenv;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Connect to the ledger with the issuing key
/// 3. Initialize service components
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!("starting with {:?}", config);

    let keys = KeyManager::from_hex(&config.ledger.private_key)
        .context("invalid ledger.private_key")?;
    let ledger = LedgerClient::connect(&config.ledger, &keys)
        .await
        .context("failed to connect to the ledger")?;
    let registry = Arc::new(ledger);

    let store = HttpClaimStore::new(&config.claims).context("invalid claim store configuration")?;
    let store = Arc::new(store);

    let issuer = CredentialIssuer::new(
        registry.clone(),
        store.clone(),
        IssuerSettings::from(&config.claims),
    );
    let verifier = Verifier::new(registry.clone(), store, VerifierSettings::from(&config.verify));
    let challenges = ChallengeRegistry::new(
        config.verify.challenge_ttl(),
        config.verify.max_pending_challenges,
    );
    let ownership = OwnershipVerifier::new(registry, challenges);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid server.bind address {}", config.server.bind))?;

    ApiServer::new(issuer, verifier, ownership)
        .run(addr)
        .await
        .context("API server stopped")
}
