pub mod claim_store;
