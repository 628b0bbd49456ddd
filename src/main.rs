// src/main.rs

//! # Academic Credential Chain Client - Main Entry Point
//!
//! Wires the chain client, signer, query and transaction layers together and
//! serves them over HTTP.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `SubstrateClient` behind the `ChainApi` seam, plus
//!    the transaction submission workflow
//! 2. **Query Layer**: read-only views over the DID, Credential and
//!    Reputation pallets
//! 3. **Transaction Layer**: signed and privileged pallet calls
//! 4. **Services Layer**: session, form wizards and the API server
//! 5. **Storage Layer**: local discardable file-reference cache
//!
//! ## Configuration
//! Defaults, then `config/academic-verify.*`, then `ACADEMIC_*` environment
//! variables (a `.env` file is honoured). See `config::AppConfig`.

use anyhow::Context;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;

use crate::blockchain::{SubstrateClient, TransactionSubmitter};
use crate::config::AppConfig;
use crate::queries::BlockchainQueries;
use crate::services::api_server::ApiServer;
use crate::services::session::Session;
use crate::storage::local_cache::LocalCache;
use crate::transactions::BlockchainTransactions;
use crate::wallet::key_management::{ExternalSigner, KeyManager};

// Module declarations (organized by functional domain)
mod blockchain;    // Node transport and submission workflow
mod config;        // Layered settings
mod error;         // Error enumerations
mod models;        // Data structures
mod queries;       // Read-only chain views
mod services;      // Session, wizards and API
mod storage;       // Local cache
mod transactions;  // Pallet calls
mod utils;         // Hashing and encoding helpers
mod wallet;        // Signing keys and credential requests

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment and configuration
/// 2. Load the signing keyring
/// 3. Build the query and transaction layers over a lazily connected client
/// 4. Start API server
///
/// # Errors
/// - If configuration cannot be loaded or the bind address is invalid
/// - If a configured secret URI is malformed
/// - If the API server cannot bind
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = AppConfig::load().context("Failed to load configuration")?;
    settings.validate();
    let addr = settings
        .socket_addr()
        .with_context(|| format!("Invalid bind address `{}`", settings.bind_addr))?;

    let keys = Arc::new(
        KeyManager::from_uris(&settings.signer_uris).context("Failed to load signer keyring")?,
    );
    info!("Signer holds {} account(s)", keys.accounts().len());

    // The node connection is opened on first use
    let chain = Arc::new(SubstrateClient::new(&settings.ws_url));
    info!("Using chain node at {}", chain.url());

    let submitter = TransactionSubmitter::new(chain.clone(), keys.clone(), settings.tx_timeout());
    let queries = BlockchainQueries::new(chain);
    let transactions = BlockchainTransactions::new(submitter);

    let cache = Arc::new(LocalCache::open(settings.cache_path.clone()).await);
    let session = Arc::new(Session::new(keys, cache.clone()));

    let api_server = ApiServer::new(queries, transactions, session, cache, settings);
    api_server.run(addr).await.context("API server failed")?;
    Ok(())
}
