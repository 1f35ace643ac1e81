// src/wallet/mod.rs
//! Signing keys for the issuing account and for ownership proofs.

pub mod key_management;
