// src/config.rs
//! Application configuration.
//!
//! Values are layered: built-in defaults, then an optional
//! `config/academic-verify.{toml,yaml,json}` file, then `ACADEMIC_*`
//! environment variables (a `.env` file is loaded first by `main`).

use config::{Config, ConfigError, Environment, File};
use log::warn;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the service.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// WebSocket endpoint of the chain node
    pub ws_url: String,
    /// Address the HTTP API listens on
    pub bind_addr: String,
    pub chain_name: String,
    pub token_symbol: String,
    pub token_decimals: u8,
    /// Upper bound on one transaction, from signing to finality
    pub tx_timeout_secs: u64,
    /// Secret URIs (e.g. `//Alice`) loaded into the signing keyring
    #[serde(default)]
    pub signer_uris: Vec<String>,
    /// Location of the local file-reference cache
    pub cache_path: PathBuf,
    /// Largest document accepted for hashing
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Loads configuration from defaults, the optional config file and the environment.
    ///
    /// # Errors
    /// Returns error if a source is malformed or a value has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("ws_url", "ws://127.0.0.1:9944")?
            .set_default("bind_addr", "127.0.0.1:3000")?
            .set_default("chain_name", "Academic Verification Chain")?
            .set_default("token_symbol", "AVC")?
            .set_default("token_decimals", 12)?
            .set_default("tx_timeout_secs", 60)?
            .set_default("cache_path", ".academic-verify/cache.json")?
            .set_default("max_upload_bytes", 10 * 1024 * 1024)?
            .add_source(File::with_name("config/academic-verify").required(false))
            .add_source(
                Environment::with_prefix("ACADEMIC")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("signer_uris"),
            )
            .build()?
            .try_deserialize()
    }

    /// Reports missing settings.
    ///
    /// # Returns
    /// `true` when every required setting is present. Missing values are
    /// logged as warnings rather than treated as fatal.
    pub fn validate(&self) -> bool {
        let mut missing = Vec::new();
        if self.ws_url.trim().is_empty() {
            missing.push("ws_url");
        }
        if self.signer_uris.is_empty() {
            warn!("No signer URIs configured; every transaction will be rejected");
        }
        if !missing.is_empty() {
            warn!("Missing configuration values: {:?}", missing);
        }
        missing.is_empty()
    }

    /// Parses the HTTP bind address.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.parse()
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_secs(self.tx_timeout_secs)
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        AppConfig {
            ws_url: "ws://127.0.0.1:9944".into(),
            bind_addr: "127.0.0.1:0".into(),
            chain_name: "Academic Verification Chain".into(),
            token_symbol: "AVC".into(),
            token_decimals: 12,
            tx_timeout_secs: 60,
            signer_uris: vec!["//Alice".into(), "//Bob".into()],
            cache_path: std::env::temp_dir().join(format!("av-test-{}.json", rand::random::<u64>())),
            max_upload_bytes: 1024,
        }
    }
}
