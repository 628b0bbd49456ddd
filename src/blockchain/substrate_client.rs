// src/blockchain/substrate_client.rs
//! Substrate node client.
//!
//! Talks to the academic verification chain over its WebSocket RPC endpoint
//! using the dynamic storage and transaction APIs, so no generated runtime
//! bindings are needed. Decoded SCALE values are rendered to JSON with the
//! runtime type registry.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use scale_info::{PortableRegistry, TypeDef, TypeDefPrimitive};
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;
use std::sync::Arc;
use subxt::dynamic::{self, Value};
use subxt::ext::scale_value::{Composite, Primitive, ValueDef, Variant};
use subxt::tx::TxStatus;
use subxt::utils::AccountId32;
use subxt::{OnlineClient, PolkadotConfig};
use subxt_signer::sr25519::Keypair;
use tokio::sync::OnceCell;

use crate::blockchain::chain_api::{
    CallArg, Capabilities, ChainApi, ChainCall, ChainInfo, Submission, TxEvent,
};
use crate::blockchain::dispatch_error::DispatchFailure;
use crate::error::ChainError;

type DecodedValue = subxt::ext::scale_value::Value<u32>;
type ChainClient = OnlineClient<PolkadotConfig>;

struct Connection {
    api: ChainClient,
    capabilities: Capabilities,
}

/// Lazily connected client for one node endpoint.
///
/// Clones share the same connection, which is opened on first use and kept
/// for the life of the process. A dropped connection is not re-established;
/// calls made after it fail with [`ChainError::Transport`].
#[derive(Clone)]
pub struct SubstrateClient {
    /// WebSocket endpoint of the node
    url: String,
    connection: Arc<OnceCell<Connection>>,
}

impl SubstrateClient {
    /// Creates a client for `url` without connecting.
    ///
    /// # Arguments
    /// * `url` - Node endpoint, `ws://` or `wss://`
    pub fn new(url: &str) -> Self {
        SubstrateClient {
            url: url.to_string(),
            connection: Arc::new(OnceCell::new()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the shared connection, opening it on first use.
    ///
    /// # Errors
    /// Returns [`ChainError::Connection`] if the node cannot be reached or its
    /// metadata cannot be fetched.
    async fn connection(&self) -> Result<&Connection, ChainError> {
        self.connection
            .get_or_try_init(|| async {
                info!("Connecting to chain node at {}", self.url);
                // Local development nodes are served over plain ws://
                let api = if self.url.starts_with("ws://") {
                    ChainClient::from_insecure_url(&self.url).await
                } else {
                    ChainClient::from_url(&self.url).await
                }
                .map_err(|e| ChainError::Connection(e.to_string()))?;

                let metadata = api.metadata();
                let capabilities = Capabilities::from_pallets(metadata.pallets().map(|p| p.name()));
                if !capabilities.did || !capabilities.credential || !capabilities.reputation {
                    warn!("Connected runtime is missing pallets: {:?}", capabilities);
                }
                info!("Connected to chain node; capabilities {:?}", capabilities);

                Ok(Connection { api, capabilities })
            })
            .await
    }
}

#[async_trait]
impl ChainApi for SubstrateClient {
    async fn capabilities(&self) -> Result<Capabilities, ChainError> {
        Ok(self.connection().await?.capabilities)
    }

    async fn fetch_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<CallArg>,
    ) -> Result<Option<JsonValue>, ChainError> {
        let conn = self.connection().await?;
        let keys = keys.into_iter().map(to_value).collect::<Result<Vec<_>, _>>()?;
        let address = dynamic::storage(pallet, entry, keys);

        let storage = conn.api.storage().at_latest().await?;
        let Some(thunk) = storage.fetch(&address).await? else {
            return Ok(None);
        };

        let decoded = thunk.to_value().map_err(|e| ChainError::Decoding(e.to_string()))?;
        let metadata = conn.api.metadata();
        Ok(Some(JsonRenderer::new(metadata.types()).value(&decoded)))
    }

    async fn account_map_entries(
        &self,
        pallet: &str,
        entry: &str,
    ) -> Result<Vec<(String, JsonValue)>, ChainError> {
        let conn = self.connection().await?;
        let address = dynamic::storage(pallet, entry, ());
        let metadata = conn.api.metadata();
        let renderer = JsonRenderer::new(metadata.types());

        let storage = conn.api.storage().at_latest().await?;
        let mut entries = storage.iter(address).await?;
        let mut out = Vec::new();
        while let Some(next) = entries.next().await {
            let pair = next?;
            // Blake2_128Concat keys end with the raw 32-byte account
            let key = &pair.key_bytes;
            if key.len() < 32 {
                warn!("Skipping {}.{} entry with short key", pallet, entry);
                continue;
            }
            let mut raw = [0u8; 32];
            raw.copy_from_slice(&key[key.len() - 32..]);
            let decoded = pair
                .value
                .to_value()
                .map_err(|e| ChainError::Decoding(e.to_string()))?;
            out.push((AccountId32(raw).to_string(), renderer.value(&decoded)));
        }
        Ok(out)
    }

    async fn best_block_number(&self) -> Result<u64, ChainError> {
        let conn = self.connection().await?;
        let block = conn.api.blocks().at_latest().await?;
        Ok(block.number().into())
    }

    async fn chain_info(&self) -> Result<ChainInfo, ChainError> {
        let conn = self.connection().await?;
        Ok(ChainInfo {
            genesis_hash: hash_hex(conn.api.genesis_hash()),
            spec_version: conn.api.runtime_version().spec_version,
            best_block: self.best_block_number().await?,
        })
    }

    async fn submit_and_watch(
        &self,
        call: ChainCall,
        signer: Keypair,
    ) -> Result<Submission, ChainError> {
        let conn = self.connection().await?;
        let label = call.label();
        let fields = call.args.into_iter().map(to_value).collect::<Result<Vec<_>, _>>()?;
        let payload = dynamic::tx(call.pallet, call.call, fields);

        let progress = conn
            .api
            .tx()
            .sign_and_submit_then_watch_default(&payload, &signer)
            .await?;
        let extrinsic_hash = hash_hex(progress.extrinsic_hash());
        debug!("Submitted {} as {}", label, extrinsic_hash);

        let metadata = conn.api.metadata();
        let events = progress
            .then(move |status| {
                let metadata = metadata.clone();
                async move { map_status(status, &metadata).await }
            })
            .boxed();
        Ok(Submission { extrinsic_hash, events })
    }
}

async fn map_status(
    status: Result<TxStatus<PolkadotConfig, ChainClient>, subxt::Error>,
    metadata: &subxt::Metadata,
) -> Result<TxEvent, ChainError> {
    match status? {
        TxStatus::Validated | TxStatus::Broadcasted { .. } | TxStatus::NoLongerInBestBlock => {
            Ok(TxEvent::Ready)
        }
        TxStatus::InBestBlock(in_block) => Ok(TxEvent::InBlock {
            block_hash: hash_hex(in_block.block_hash()),
        }),
        TxStatus::InFinalizedBlock(in_block) => {
            let block_hash = hash_hex(in_block.block_hash());
            let failure = match in_block.wait_for_success().await {
                Ok(events) => sudo_failure(&events, metadata),
                Err(subxt::Error::Runtime(dispatch_error)) => {
                    Some(DispatchFailure::from_dispatch_error(&dispatch_error))
                }
                Err(e) => return Err(e.into()),
            };
            Ok(TxEvent::Finalized { block_hash, failure })
        }
        TxStatus::Error { message }
        | TxStatus::Invalid { message }
        | TxStatus::Dropped { message } => Ok(TxEvent::Dropped { message }),
    }
}

/// A sudo extrinsic succeeds even when the wrapped call fails; the inner
/// result is only reported through the `Sudo.Sudid` event.
fn sudo_failure(
    events: &subxt::blocks::ExtrinsicEvents<PolkadotConfig>,
    metadata: &subxt::Metadata,
) -> Option<DispatchFailure> {
    let renderer = JsonRenderer::new(metadata.types());
    for event in events.iter().flatten() {
        if event.pallet_name() != "Sudo" || event.variant_name() != "Sudid" {
            continue;
        }
        let Ok(fields) = event.field_values() else {
            continue;
        };
        if let Some(error) = sudid_error(&renderer.fields(&fields)) {
            return Some(match module_error(error) {
                Some((index, code)) => describe_module_error(metadata, index, code),
                None => DispatchFailure::Other(format!("Sudo.Sudid: {}", error)),
            });
        }
    }
    None
}

/// The `Err` side of a rendered `Sudid { sudo_result }` event.
fn sudid_error(fields: &JsonValue) -> Option<&JsonValue> {
    fields.get("sudo_result").and_then(|r| r.get("Err"))
}

/// Pallet index and error code of a rendered `DispatchError::Module`.
///
/// The error bytes arrive as `0x` hex when the type registry identifies them,
/// or as a plain byte array otherwise.
fn module_error(error: &JsonValue) -> Option<(u8, u8)> {
    let module = single(single(error).get("Module")?);
    let index = u8::try_from(module.get("index")?.as_u64()?).ok()?;
    let code = match module.get("error")? {
        JsonValue::String(raw) => *hex::decode(raw.trim_start_matches("0x")).ok()?.first()?,
        JsonValue::Array(bytes) => u8::try_from(bytes.first()?.as_u64()?).ok()?,
        JsonValue::Number(n) => u8::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    Some((index, code))
}

/// Unwraps the one-element array an unnamed variant field renders as.
fn single(value: &JsonValue) -> &JsonValue {
    match value {
        JsonValue::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}

/// Resolves a module error against runtime metadata.
fn describe_module_error(metadata: &subxt::Metadata, index: u8, code: u8) -> DispatchFailure {
    let Some(pallet) = metadata.pallet_by_index(index) else {
        return DispatchFailure::Other(format!("Module error {} in unknown pallet {}", code, index));
    };
    match pallet.error_variant_by_index(code) {
        Some(variant) => DispatchFailure::Module {
            section: pallet.name().to_string(),
            name: variant.name.clone(),
            docs: variant.docs.clone(),
        },
        None => DispatchFailure::module(pallet.name(), &format!("Error{}", code), ""),
    }
}

fn hash_hex(hash: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(hash.as_ref()))
}

/// Converts a call or key argument to a dynamic SCALE value.
fn to_value(arg: CallArg) -> Result<Value, ChainError> {
    Ok(match arg {
        CallArg::Account(address) => {
            let account = AccountId32::from_str(&address)
                .map_err(|_| ChainError::InvalidAddress(address.clone()))?;
            Value::from_bytes(account.0)
        }
        CallArg::Bytes(bytes) => Value::from_bytes(bytes),
        CallArg::U8(n) => Value::u128(n.into()),
        CallArg::U32(n) => Value::u128(n.into()),
        CallArg::Variant(name) => Value::unnamed_variant(name, Vec::<Value>::new()),
        CallArg::Optional(None) => Value::unnamed_variant("None", Vec::<Value>::new()),
        CallArg::Optional(Some(inner)) => Value::unnamed_variant("Some", [to_value(*inner)?]),
        CallArg::Call(call) => {
            let ChainCall { pallet, call, args } = *call;
            let fields = args.into_iter().map(to_value).collect::<Result<Vec<_>, _>>()?;
            Value::unnamed_variant(pallet, [Value::unnamed_variant(call, fields)])
        }
    })
}

/// Renders decoded SCALE values the way the chain's JSON RPC consumers expect.
struct JsonRenderer<'a> {
    types: &'a PortableRegistry,
}

impl<'a> JsonRenderer<'a> {
    fn new(types: &'a PortableRegistry) -> Self {
        JsonRenderer { types }
    }

    fn value(&self, value: &DecodedValue) -> JsonValue {
        match &value.value {
            ValueDef::Primitive(p) => primitive(p),
            ValueDef::Variant(v) => self.variant(v),
            ValueDef::Composite(c) => self.composite(value.context, c),
            _ => JsonValue::Null,
        }
    }

    fn variant(&self, variant: &Variant<u32>) -> JsonValue {
        match (variant.name.as_str(), &variant.values) {
            ("None", Composite::Unnamed(values)) if values.is_empty() => JsonValue::Null,
            ("Some", Composite::Unnamed(values)) if values.len() == 1 => self.value(&values[0]),
            (name, Composite::Unnamed(values)) if values.is_empty() => {
                JsonValue::String(name.to_string())
            }
            (name, fields) => {
                let mut map = Map::new();
                map.insert(name.to_string(), self.fields(fields));
                JsonValue::Object(map)
            }
        }
    }

    fn composite(&self, type_id: u32, composite: &Composite<u32>) -> JsonValue {
        let Some(ty) = self.types.resolve(type_id) else {
            return self.fields(composite);
        };

        if ty.path.segments.last().map(String::as_str) == Some("AccountId32") {
            if let Some(raw) = raw_bytes(composite).and_then(|b| <[u8; 32]>::try_from(b).ok()) {
                return JsonValue::String(AccountId32(raw).to_string());
            }
        }

        match &ty.type_def {
            TypeDef::Sequence(seq) if self.is_u8(seq.type_param.id) => self.hex(composite),
            TypeDef::Array(arr) if self.is_u8(arr.type_param.id) => self.hex(composite),
            // Newtype wrappers such as BoundedVec render as their inner value
            TypeDef::Composite(_) => match composite {
                Composite::Unnamed(values) if values.len() == 1 => self.value(&values[0]),
                _ => self.fields(composite),
            },
            _ => self.fields(composite),
        }
    }

    fn fields(&self, composite: &Composite<u32>) -> JsonValue {
        match composite {
            Composite::Named(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), self.value(value)))
                    .collect(),
            ),
            Composite::Unnamed(values) => {
                JsonValue::Array(values.iter().map(|v| self.value(v)).collect())
            }
        }
    }

    fn hex(&self, composite: &Composite<u32>) -> JsonValue {
        match raw_bytes(composite) {
            Some(bytes) => JsonValue::String(hash_hex(bytes)),
            None => self.fields(composite),
        }
    }

    fn is_u8(&self, type_id: u32) -> bool {
        matches!(
            self.types.resolve(type_id).map(|t| &t.type_def),
            Some(TypeDef::Primitive(TypeDefPrimitive::U8))
        )
    }
}

fn primitive(p: &Primitive) -> JsonValue {
    match p {
        Primitive::Bool(b) => JsonValue::Bool(*b),
        Primitive::Char(c) => JsonValue::String(c.to_string()),
        Primitive::String(s) => JsonValue::String(s.clone()),
        Primitive::U128(n) => match u64::try_from(*n) {
            Ok(small) => JsonValue::from(small),
            Err(_) => JsonValue::String(n.to_string()),
        },
        Primitive::I128(n) => match i64::try_from(*n) {
            Ok(small) => JsonValue::from(small),
            Err(_) => JsonValue::String(n.to_string()),
        },
        Primitive::U256(bytes) | Primitive::I256(bytes) => JsonValue::String(hash_hex(bytes)),
    }
}

/// Flattens a composite of small unsigned integers into bytes.
fn raw_bytes(composite: &Composite<u32>) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    collect_bytes(composite, &mut out).then_some(out)
}

fn collect_bytes(composite: &Composite<u32>, out: &mut Vec<u8>) -> bool {
    for value in composite.values() {
        match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) => match u8::try_from(*n) {
                Ok(byte) => out.push(byte),
                Err(_) => return false,
            },
            ValueDef::Composite(inner) => {
                if !collect_bytes(inner, out) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_argument_must_be_ss58() {
        let err = to_value(CallArg::account("not-an-address")).unwrap_err();
        assert!(matches!(err, ChainError::InvalidAddress(_)));

        let alice = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
        assert!(to_value(CallArg::account(alice)).is_ok());
    }

    #[test]
    fn test_sudo_call_becomes_nested_variant() {
        let inner = ChainCall::new("Did", "verify_institution", vec![CallArg::U8(1)]);
        let value = to_value(CallArg::Call(Box::new(inner))).unwrap();
        match value.value {
            ValueDef::Variant(outer) => {
                assert_eq!(outer.name, "Did");
                let inner = outer.values.values().next().unwrap();
                assert!(matches!(&inner.value, ValueDef::Variant(v) if v.name == "verify_institution"));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_sudid_module_error_is_located() {
        // Sudid { sudo_result: Err(Module(ModuleError { index: 9, error: [5, 0, 0, 0] })) }
        let event = Value::named_composite([(
            "sudo_result",
            Value::unnamed_variant(
                "Err",
                [Value::unnamed_variant(
                    "Module",
                    [Value::named_composite([
                        ("index", Value::u128(9)),
                        (
                            "error",
                            Value::unnamed_composite([5u128, 0, 0, 0].map(Value::u128)),
                        ),
                    ])],
                )],
            ),
        )])
        .map_context(|_| 0u32);

        let registry = PortableRegistry::from(scale_info::Registry::new());
        let rendered = JsonRenderer::new(&registry).value(&event);
        let error = sudid_error(&rendered).unwrap();
        assert_eq!(module_error(error), Some((9, 5)));
    }

    #[test]
    fn test_module_error_accepts_hex_bytes() {
        let error = serde_json::json!([{ "Module": { "index": 12, "error": "0x03000000" } }]);
        assert_eq!(module_error(&error), Some((12, 3)));

        assert_eq!(module_error(&serde_json::json!(["BadOrigin"])), None);
        let ok = serde_json::json!({ "sudo_result": { "Ok": [] } });
        assert!(sudid_error(&ok).is_none());
    }

    #[test]
    fn test_raw_bytes_rejects_wide_integers() {
        let small = Composite::Unnamed(vec![
            Value::u128(1).map_context(|_| 0u32),
            Value::u128(255).map_context(|_| 0u32),
        ]);
        assert_eq!(raw_bytes(&small), Some(vec![1, 255]));

        let wide = Composite::Unnamed(vec![Value::u128(256).map_context(|_| 0u32)]);
        assert_eq!(raw_bytes(&wide), None);
    }

    #[test]
    fn test_large_integers_render_as_strings() {
        assert_eq!(primitive(&Primitive::U128(42)), JsonValue::from(42u64));
        let big = u128::from(u64::MAX) + 1;
        assert_eq!(primitive(&Primitive::U128(big)), JsonValue::String(big.to_string()));
    }
}
