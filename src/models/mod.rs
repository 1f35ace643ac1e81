// src/models/mod.rs
//! Data structures shared by the ledger client, the claim store and the services.

pub mod claim;
pub mod credential;
pub mod requests;
