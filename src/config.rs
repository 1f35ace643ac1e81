// src/config.rs
//! Service configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. an optional TOML file (`credential-chain.toml` unless `CCS_CONFIG` names another)
//! 3. environment variables prefixed `CCS_`, with `__` separating sections,
//!    e.g. `CCS_LEDGER__RPC_URL` or `CCS_VERIFY__MAX_CHAIN_DEPTH`
//!
//! `main` loads `.env` through `dotenv` before calling [`AppConfig::load`], so
//! the same variables can live in a dotenv file during development.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "credential-chain";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub claims: ClaimStoreConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

/// Connection to the credential registry contract.
///
/// Custom `Debug` redacts the private key.
#[derive(Clone, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    pub private_key: String,
    /// Blocks to wait after inclusion before a write counts as done
    pub confirmations: usize,
    pub timeout_secs: u64,
}

impl LedgerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_url", &self.rpc_url)
            .field("contract_address", &self.contract_address)
            .field("private_key", &"[REDACTED]")
            .field("confirmations", &self.confirmations)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaimStoreConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub bcrypt_cost: u32,
    /// Attempts at writing a claim under a fresh key before giving up
    pub put_retries: u32,
}

impl ClaimStoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    pub max_chain_depth: usize,
    pub challenge_ttl_secs: u64,
    /// Upper bound on unexpired challenges held in memory
    pub max_pending_challenges: usize,
    pub enforce_expiry: bool,
}

impl VerifyConfig {
    pub fn challenge_ttl(&self) -> Duration {
        Duration::from_secs(self.challenge_ttl_secs)
    }
}

impl AppConfig {
    /// Loads defaults, the optional config file and `CCS_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("CCS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::defaults()?
            .add_source(File::with_name(&file).required(false))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    /// `CCS_` prefix, `__` between nested keys.
    fn environment() -> Environment {
        Environment::with_prefix("CCS").prefix_separator("_").separator("__")
    }

    /// Builder pre-populated with every default value.
    ///
    /// `ledger.contract_address` and `ledger.private_key` have no default and
    /// must come from a later source.
    pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.bind", "127.0.0.1:3000")?
            .set_default("ledger.rpc_url", "http://127.0.0.1:8545")?
            .set_default("ledger.confirmations", 1_i64)?
            .set_default("ledger.timeout_secs", 30_i64)?
            .set_default("claims.base_url", "http://127.0.0.1:4000")?
            .set_default("claims.timeout_secs", 10_i64)?
            .set_default("claims.bcrypt_cost", 10_i64)?
            .set_default("claims.put_retries", 3_i64)?
            .set_default("verify.max_chain_depth", 23_i64)?
            .set_default("verify.challenge_ttl_secs", 300_i64)?
            .set_default("verify.max_pending_challenges", 10_000_i64)?
            .set_default("verify.enforce_expiry", true)
    }
}
