// src/lib.rs
//! # Credential Chain
//!
//! Issues, revokes and verifies chained credentials. Each credential is a
//! token on a registry contract that anchors the hash of an off-chain claim
//! and may point at a parent credential.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: [`blockchain::registry::Registry`] and its ethers-backed `LedgerClient`
//! 2. **Storage Layer**: [`storage::claim_store::ClaimStore`] and its HTTP client
//! 3. **Services Layer**: mint/revoke pipelines, chain verification, ownership
//!    proofs and the HTTP API
//! 4. **Cryptography Layer**: content hashing, message signing and key management

pub mod blockchain;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod testing;
