// src/blockchain/mod.rs
//! Chain access: the transport seam, its Substrate implementation and the
//! transaction submission workflow built on top of it.

pub mod chain_api;
pub mod dispatch_error;
pub mod substrate_client;
pub mod transaction;

#[cfg(test)]
pub mod fake_chain;

pub use substrate_client::SubstrateClient;
pub use transaction::TransactionSubmitter;
