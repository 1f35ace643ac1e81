// src/utils/mod.rs
//! Helper functions: hashing, signatures, canonical serialization.

pub mod crypto;
pub mod serialization;
