pub mod asset;
pub mod balance;
pub mod broadcast;
pub mod chain;
pub mod errors;
pub mod page;
pub mod pending_build;
pub mod utxo;
