// src/blockchain/chain_api.rs
//! Transport seam between the query/transaction layers and a chain node.
//!
//! Everything above this trait is node-agnostic: storage values arrive as
//! JSON already normalised (byte strings as `0x` hex, accounts as SS58, unit
//! enum variants as their name, `Option` as value or `null`) and calls are
//! described with [`ChainCall`] rather than generated runtime types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use subxt_signer::sr25519::Keypair;

use crate::blockchain::dispatch_error::DispatchFailure;
use crate::error::ChainError;

/// Runtime pallet names used by this client.
pub mod pallets {
    pub const DID: &str = "Did";
    pub const CREDENTIAL: &str = "Credential";
    pub const REPUTATION: &str = "Reputation";
    pub const SUDO: &str = "Sudo";
    pub const SYSTEM: &str = "System";
}

/// One argument of a storage key or a dispatchable call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    /// SS58-encoded account
    Account(String),
    /// Raw bytes; fixed arrays and bounded vectors alike
    Bytes(Vec<u8>),
    U8(u8),
    U32(u32),
    /// Field-less enum variant, e.g. `Degree`
    Variant(String),
    Optional(Option<Box<CallArg>>),
    /// A nested runtime call, as taken by `Sudo.sudo`
    Call(Box<ChainCall>),
}

impl CallArg {
    pub fn account(address: &str) -> Self {
        CallArg::Account(address.to_string())
    }

    pub fn bytes(data: impl AsRef<[u8]>) -> Self {
        CallArg::Bytes(data.as_ref().to_vec())
    }

    pub fn variant(name: &str) -> Self {
        CallArg::Variant(name.to_string())
    }
}

/// A dispatchable call addressed by pallet and call name.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainCall {
    pub pallet: &'static str,
    pub call: &'static str,
    pub args: Vec<CallArg>,
}

impl ChainCall {
    pub fn new(pallet: &'static str, call: &'static str, args: Vec<CallArg>) -> Self {
        ChainCall { pallet, call, args }
    }

    /// Wraps `inner` in the administrative `Sudo.sudo` envelope.
    pub fn sudo(inner: ChainCall) -> Self {
        ChainCall::new(pallets::SUDO, "sudo", vec![CallArg::Call(Box::new(inner))])
    }

    /// `Pallet.call` label used in logs.
    pub fn label(&self) -> String {
        format!("{}.{}", self.pallet, self.call)
    }
}

/// Pallets the connected runtime exposes, resolved once per connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub did: bool,
    pub credential: bool,
    pub reputation: bool,
    pub sudo: bool,
}

impl Capabilities {
    /// Builds the set from the pallet names found in runtime metadata.
    pub fn from_pallets<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut caps = Capabilities::default();
        for name in names {
            match name {
                pallets::DID => caps.did = true,
                pallets::CREDENTIAL => caps.credential = true,
                pallets::REPUTATION => caps.reputation = true,
                pallets::SUDO => caps.sudo = true,
                _ => {}
            }
        }
        caps
    }

    #[cfg(test)]
    pub fn all() -> Self {
        Capabilities {
            did: true,
            credential: true,
            reputation: true,
            sudo: true,
        }
    }

    /// Whether `pallet` is available. Pallets this client does not track
    /// (such as `System`) are assumed present.
    pub fn supports(&self, pallet: &str) -> bool {
        match pallet {
            pallets::DID => self.did,
            pallets::CREDENTIAL => self.credential,
            pallets::REPUTATION => self.reputation,
            pallets::SUDO => self.sudo,
            _ => true,
        }
    }
}

/// Basic facts about the connected chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainInfo {
    pub genesis_hash: String,
    pub spec_version: u32,
    pub best_block: u64,
}

/// Lifecycle notification for a submitted extrinsic.
#[derive(Debug, Clone, PartialEq)]
pub enum TxEvent {
    /// Accepted by the pool; not yet in a block
    Ready,
    InBlock { block_hash: String },
    /// Irreversibly included; `failure` holds the decoded dispatch error if
    /// the extrinsic failed
    Finalized {
        block_hash: String,
        failure: Option<DispatchFailure>,
    },
    /// The pool dropped or invalidated the extrinsic
    Dropped { message: String },
}

/// A submitted extrinsic and the stream of its lifecycle events.
pub struct Submission {
    pub extrinsic_hash: String,
    pub events: BoxStream<'static, Result<TxEvent, ChainError>>,
}

/// Read and write access to a chain node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Pallets available on the connected runtime.
    async fn capabilities(&self) -> Result<Capabilities, ChainError>;

    /// Keyed storage lookup. `Ok(None)` means the entry is empty.
    async fn fetch_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<CallArg>,
    ) -> Result<Option<Value>, ChainError>;

    /// Every entry of an account-keyed map as `(ss58, value)` pairs.
    async fn account_map_entries(
        &self,
        pallet: &str,
        entry: &str,
    ) -> Result<Vec<(String, Value)>, ChainError>;

    async fn best_block_number(&self) -> Result<u64, ChainError>;

    async fn chain_info(&self) -> Result<ChainInfo, ChainError>;

    /// Signs `call` with `signer`, submits it and watches its progress.
    async fn submit_and_watch(
        &self,
        call: ChainCall,
        signer: Keypair,
    ) -> Result<Submission, ChainError>;
}
