pub mod ledger_client;
pub mod registry;
