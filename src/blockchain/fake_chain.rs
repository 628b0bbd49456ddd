// src/blockchain/fake_chain.rs
//! In-memory chain used by tests.
//!
//! Applies the DID, Credential, Reputation and Sudo pallet rules to a local
//! state and serves storage in the same JSON shape [`SubstrateClient`]
//! renders, so the query and transaction layers can be exercised end to end.
//!
//! [`SubstrateClient`]: crate::blockchain::SubstrateClient

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use subxt_signer::sr25519::Keypair;

use crate::blockchain::chain_api::{
    pallets, CallArg, Capabilities, ChainApi, ChainCall, ChainInfo, Submission, TxEvent,
};
use crate::blockchain::dispatch_error::DispatchFailure;
use crate::error::ChainError;
use crate::utils::crypto::hash_data;
use crate::wallet::key_management::{address_of, normalize};

pub const ALICE: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";
pub const BOB: &str = "5FHneW46xGXgs5mUiveU4sbTyGBzmstUspZC92UhjJM694ty";
pub const CHARLIE: &str = "5FLSigC9HGRKVhB9FiEo4Y3koPsNmBmLJbpXg2mp1hXcS59Y";

#[derive(Default)]
struct State {
    block: u64,
    dids: BTreeMap<String, Value>,
    institutions: BTreeMap<String, Value>,
    credentials: BTreeMap<String, Value>,
    by_holder: BTreeMap<String, Vec<Value>>,
    by_issuer: BTreeMap<String, Vec<String>>,
    by_hash: BTreeMap<String, String>,
    scores: BTreeMap<String, Value>,
    given: BTreeMap<String, Vec<Value>>,
    received: BTreeMap<String, Vec<Value>>,
    balances: BTreeMap<String, u128>,
    next_id: u64,
    broken: HashSet<String>,
    offline: bool,
    stall: bool,
}

pub struct FakeChain {
    capabilities: Capabilities,
    sudo_key: String,
    state: Mutex<State>,
}

type Dispatch = Result<(), DispatchFailure>;

fn module(pallet: &str, name: &str) -> DispatchFailure {
    DispatchFailure::module(pallet, name, "")
}

impl FakeChain {
    /// A chain with every pallet and Alice as the sudo key.
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        FakeChain {
            capabilities,
            sudo_key: ALICE.to_string(),
            state: Mutex::new(State {
                block: 1,
                ..Default::default()
            }),
        }
    }

    /// Makes every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Accepts submissions but never reports progress.
    pub fn stall_submissions(&self) {
        self.state.lock().unwrap().stall = true;
    }

    /// Makes lookups keyed by `key` fail with a decoding error.
    pub fn break_key(&self, key: &str) {
        self.state.lock().unwrap().broken.insert(key.to_string());
    }

    pub fn set_balance(&self, address: &str, free: u128) {
        self.state.lock().unwrap().balances.insert(address.to_string(), free);
    }

    pub fn advance_blocks(&self, n: u64) {
        self.state.lock().unwrap().block += n;
    }

    pub fn block(&self) -> u64 {
        self.state.lock().unwrap().block
    }

    /// Writes a raw storage value, bypassing pallet rules.
    pub fn put_storage(&self, pallet: &str, entry: &str, key: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        let key = key.to_string();
        let list = |v: &Value| v.as_array().cloned().unwrap_or_default();
        match (pallet, entry) {
            (pallets::DID, "DidDocuments") => {
                state.dids.insert(key, value);
            }
            (pallets::DID, "Institutions") => {
                state.institutions.insert(key, value);
            }
            (pallets::CREDENTIAL, "Credentials") => {
                state.credentials.insert(key, value);
            }
            (pallets::CREDENTIAL, "CredentialsByHolder") => {
                state.by_holder.insert(key, list(&value));
            }
            (pallets::CREDENTIAL, "CredentialsByIssuer") => {
                let ids = list(&value).iter().filter_map(|v| v.as_str().map(String::from)).collect();
                state.by_issuer.insert(key, ids);
            }
            (pallets::CREDENTIAL, "CredentialByHash") => {
                state.by_hash.insert(key, value.as_str().unwrap_or_default().to_string());
            }
            (pallets::REPUTATION, "ReputationScores") => {
                state.scores.insert(key, value);
            }
            (pallets::REPUTATION, "EndorsementsGiven") => {
                state.given.insert(key, list(&value));
            }
            (pallets::REPUTATION, "EndorsementsReceived") => {
                state.received.insert(key, list(&value));
            }
            _ => panic!("unsupported storage {}.{}", pallet, entry),
        }
    }

    fn execute(&self, who: &str, call: &ChainCall) -> Dispatch {
        if !self.capabilities.supports(call.pallet) {
            return Err(DispatchFailure::Other(format!("unknown pallet {}", call.pallet)));
        }
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        match (call.pallet, call.call) {
            (pallets::SUDO, "sudo") => {
                if who != self.sudo_key {
                    return Err(module(pallets::SUDO, "RequireSudo"));
                }
                match call.args.first() {
                    Some(CallArg::Call(inner)) => state.dispatch_root(inner),
                    _ => Err(DispatchFailure::Other("malformed sudo call".into())),
                }
            }
            _ => state.dispatch_signed(who, call),
        }
    }

    fn storage_key(keys: &[CallArg]) -> Option<String> {
        match keys.first()? {
            CallArg::Account(address) => normalize(address),
            CallArg::Bytes(bytes) => Some(format!("0x{}", hex::encode(bytes))),
            _ => None,
        }
    }
}

impl State {
    fn dispatch_root(&mut self, call: &ChainCall) -> Dispatch {
        match (call.pallet, call.call) {
            (pallets::DID, "verify_institution") | (pallets::DID, "revoke_institution") => {
                let account = arg_account(&call.args, 0)?;
                let institution = self
                    .institutions
                    .get_mut(&account)
                    .ok_or_else(|| module(pallets::DID, "InstitutionNotFound"))?;
                institution["verified"] = json!(call.call == "verify_institution");
                Ok(())
            }
            _ => Err(DispatchFailure::Other("unsupported root call".into())),
        }
    }

    fn dispatch_signed(&mut self, who: &str, call: &ChainCall) -> Dispatch {
        let args = &call.args;
        match (call.pallet, call.call) {
            (pallets::DID, "create_did") => {
                if self.dids.contains_key(who) {
                    return Err(module(pallets::DID, "DidAlreadyExists"));
                }
                let key = key_entry(arg_bytes(args, 0)?, arg_variant(args, 1)?);
                let block = self.block;
                self.dids.insert(
                    who.to_string(),
                    json!({
                        "controller": who,
                        "public_keys": [key],
                        "created_at": block,
                        "updated_at": block,
                        "active": true,
                    }),
                );
                Ok(())
            }
            (pallets::DID, "add_public_key") => {
                let key = key_entry(arg_bytes(args, 0)?, arg_variant(args, 1)?);
                let block = self.block;
                let doc = self.dids.get_mut(who).ok_or_else(|| module(pallets::DID, "DidNotFound"))?;
                let keys = doc["public_keys"].as_array_mut().ok_or_else(|| module(pallets::DID, "DidNotFound"))?;
                if keys.iter().any(|k| k["key_id"] == key["key_id"]) {
                    return Err(module(pallets::DID, "PublicKeyAlreadyExists"));
                }
                keys.push(key);
                doc["updated_at"] = json!(block);
                Ok(())
            }
            (pallets::DID, "register_institution") => {
                let name = arg_bytes(args, 0)?;
                if !self.dids.contains_key(who) {
                    return Err(module(pallets::DID, "DidNotFound"));
                }
                if self.institutions.contains_key(who) {
                    return Err(module(pallets::DID, "InstitutionAlreadyRegistered"));
                }
                if name.is_empty() {
                    return Err(module(pallets::DID, "InvalidInstitutionName"));
                }
                let block = self.block;
                self.institutions.insert(
                    who.to_string(),
                    json!({
                        "name": format!("0x{}", hex::encode(name)),
                        "did": who,
                        "verified": false,
                        "registered_at": block,
                    }),
                );
                Ok(())
            }
            (pallets::DID, _) => Err(DispatchFailure::Other("BadOrigin".into())),
            (pallets::CREDENTIAL, "issue_credential") => self.issue(who, args),
            (pallets::CREDENTIAL, "revoke_credential") => {
                let id = hex_arg(args, 0)?;
                let credential = self
                    .credentials
                    .get_mut(&id)
                    .ok_or_else(|| module(pallets::CREDENTIAL, "CredentialNotFound"))?;
                if credential["issuer"] != json!(who) {
                    return Err(module(pallets::CREDENTIAL, "NotAuthorized"));
                }
                if credential["status"] == json!("Revoked") {
                    return Err(module(pallets::CREDENTIAL, "CredentialAlreadyRevoked"));
                }
                credential["status"] = json!("Revoked");
                Ok(())
            }
            (pallets::CREDENTIAL, "verify_credential") => {
                let hash = hex_arg(args, 0)?;
                let id = self
                    .by_hash
                    .get(&hash)
                    .ok_or_else(|| module(pallets::CREDENTIAL, "CredentialNotFound"))?;
                let credential = self
                    .credentials
                    .get(id)
                    .ok_or_else(|| module(pallets::CREDENTIAL, "CredentialNotFound"))?;
                if credential["status"] != json!("Active") {
                    return Err(module(pallets::CREDENTIAL, "CredentialNotActive"));
                }
                if let Some(expiry) = credential["expires_at"].as_u64() {
                    if self.block > expiry {
                        return Err(module(pallets::CREDENTIAL, "CredentialExpired"));
                    }
                }
                Ok(())
            }
            (pallets::CREDENTIAL, "update_credential_metadata") => {
                let id = hex_arg(args, 0)?;
                let metadata = format!("0x{}", hex::encode(arg_bytes(args, 1)?));
                let credential = self
                    .credentials
                    .get_mut(&id)
                    .ok_or_else(|| module(pallets::CREDENTIAL, "CredentialNotFound"))?;
                if credential["issuer"] != json!(who) {
                    return Err(module(pallets::CREDENTIAL, "NotAuthorized"));
                }
                if credential["status"] != json!("Active") {
                    return Err(module(pallets::CREDENTIAL, "CredentialNotActive"));
                }
                credential["metadata"] = json!(metadata);
                Ok(())
            }
            (pallets::REPUTATION, "endorse") => self.endorse(who, args),
            (pallets::REPUTATION, "remove_endorsement") => {
                let endorsee = arg_account(args, 0)?;
                let given = self.given.entry(who.to_string()).or_default();
                let before = given.len();
                given.retain(|e| e["endorsee"] != json!(endorsee));
                if given.len() == before {
                    return Err(module(pallets::REPUTATION, "EndorsementNotFound"));
                }
                self.received
                    .entry(endorsee.clone())
                    .or_default()
                    .retain(|e| e["endorser"] != json!(who));
                self.bump(who, "endorsements_given", -1);
                self.bump(&endorsee, "endorsements_received", -1);
                Ok(())
            }
            _ => Err(DispatchFailure::Other(format!("unsupported call {}", call.label()))),
        }
    }

    fn issue(&mut self, issuer: &str, args: &[CallArg]) -> Dispatch {
        let holder = arg_account(args, 0)?;
        let hash = hex_arg(args, 1)?;
        let kind = arg_variant(args, 2)?;
        let metadata = format!("0x{}", hex::encode(arg_bytes(args, 3)?));
        let expires_at = match args.get(4) {
            Some(CallArg::Optional(Some(inner))) => match inner.as_ref() {
                CallArg::U32(n) => json!(n),
                _ => return Err(DispatchFailure::Other("bad expiry".into())),
            },
            Some(CallArg::Optional(None)) => Value::Null,
            _ => return Err(DispatchFailure::Other("bad expiry".into())),
        };

        let verified = self
            .institutions
            .get(issuer)
            .map(|i| i["verified"] == json!(true))
            .unwrap_or(false);
        if !verified {
            return Err(module(pallets::CREDENTIAL, "IssuerNotVerified"));
        }
        if !self.dids.contains_key(issuer) {
            return Err(module(pallets::CREDENTIAL, "IssuerHasNoDid"));
        }
        if !self.dids.contains_key(&holder) {
            return Err(module(pallets::CREDENTIAL, "HolderHasNoDid"));
        }
        if self.by_hash.contains_key(&hash) {
            return Err(module(pallets::CREDENTIAL, "CredentialAlreadyExists"));
        }

        self.next_id += 1;
        let seed = format!("{}{}{}{}", issuer, holder, hash, self.next_id);
        let id = format!("0x{}", hex::encode(hash_data(seed.as_bytes())));
        self.credentials.insert(
            id.clone(),
            json!({
                "credential_id": id,
                "credential_hash": hash,
                "holder": holder,
                "issuer": issuer,
                "credential_type": kind,
                "metadata": metadata,
                "issued_at": self.block,
                "expires_at": expires_at,
                "status": "Active",
            }),
        );
        self.by_holder
            .entry(holder)
            .or_default()
            .push(json!({ "credential_id": id, "credential_type": kind }));
        self.by_issuer.entry(issuer.to_string()).or_default().push(id.clone());
        self.by_hash.insert(hash, id);
        Ok(())
    }

    fn endorse(&mut self, endorser: &str, args: &[CallArg]) -> Dispatch {
        let endorsee = arg_account(args, 0)?;
        let kind = arg_variant(args, 1)?;
        let comment = format!("0x{}", hex::encode(arg_bytes(args, 2)?));
        let weight = match args.get(3) {
            Some(CallArg::U8(w)) => *w,
            _ => return Err(DispatchFailure::Other("bad weight".into())),
        };

        if endorser == endorsee {
            return Err(module(pallets::REPUTATION, "CannotEndorseSelf"));
        }
        if !(1..=10).contains(&weight) {
            return Err(module(pallets::REPUTATION, "InvalidWeight"));
        }
        if !self.dids.contains_key(endorser) || !self.dids.contains_key(&endorsee) {
            return Err(module(pallets::REPUTATION, "NoDid"));
        }
        let already = self
            .given
            .get(endorser)
            .map(|list| list.iter().any(|e| e["endorsee"] == json!(endorsee)))
            .unwrap_or(false);
        if already {
            return Err(module(pallets::REPUTATION, "AlreadyEndorsed"));
        }

        let record = json!({
            "endorser": endorser,
            "endorsee": endorsee,
            "endorsement_type": kind,
            "comment": comment,
            "created_at": self.block,
            "weight": weight,
        });
        self.given.entry(endorser.to_string()).or_default().push(record.clone());
        self.received.entry(endorsee.clone()).or_default().push(record);
        self.bump(endorser, "endorsements_given", 1);
        self.bump(&endorsee, "endorsements_received", 1);
        Ok(())
    }

    /// Adjusts one score counter and recomputes the total.
    fn bump(&mut self, account: &str, field: &str, delta: i64) {
        let score = self.scores.entry(account.to_string()).or_insert_with(|| {
            json!({
                "credentials_issued": 0,
                "credentials_verified": 0,
                "endorsements_received": 0,
                "endorsements_given": 0,
                "total_score": 0,
            })
        });
        let current = score[field].as_i64().unwrap_or(0);
        score[field] = json!((current + delta).max(0));
        let get = |name: &str| score[name].as_u64().unwrap_or(0);
        let total = (get("credentials_issued") * 10
            + get("credentials_verified") * 5
            + get("endorsements_received") * 20)
            .min(1000);
        score["total_score"] = json!(total);
    }
}

fn key_entry(public_key: Vec<u8>, key_type: String) -> Value {
    json!({
        "key_id": format!("0x{}", hex::encode(hash_data(&public_key))),
        "key_type": key_type,
        "public_key": format!("0x{}", hex::encode(public_key)),
    })
}

fn arg_account(args: &[CallArg], i: usize) -> Result<String, DispatchFailure> {
    match args.get(i) {
        Some(CallArg::Account(a)) => normalize(a).ok_or_else(|| DispatchFailure::Other("bad account".into())),
        _ => Err(DispatchFailure::Other(format!("argument {} is not an account", i))),
    }
}

fn arg_bytes(args: &[CallArg], i: usize) -> Result<Vec<u8>, DispatchFailure> {
    match args.get(i) {
        Some(CallArg::Bytes(b)) => Ok(b.clone()),
        _ => Err(DispatchFailure::Other(format!("argument {} is not bytes", i))),
    }
}

fn hex_arg(args: &[CallArg], i: usize) -> Result<String, DispatchFailure> {
    arg_bytes(args, i).map(|b| format!("0x{}", hex::encode(b)))
}

fn arg_variant(args: &[CallArg], i: usize) -> Result<String, DispatchFailure> {
    match args.get(i) {
        Some(CallArg::Variant(v)) => Ok(v.clone()),
        _ => Err(DispatchFailure::Other(format!("argument {} is not a variant", i))),
    }
}

#[async_trait]
impl ChainApi for FakeChain {
    async fn capabilities(&self) -> Result<Capabilities, ChainError> {
        Ok(self.capabilities)
    }

    async fn fetch_storage(
        &self,
        pallet: &str,
        entry: &str,
        keys: Vec<CallArg>,
    ) -> Result<Option<Value>, ChainError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(ChainError::Transport("connection refused".into()));
        }
        let key = Self::storage_key(&keys).ok_or_else(|| ChainError::InvalidArgument("key".into()))?;
        if state.broken.contains(&key) {
            return Err(ChainError::Decoding(format!("cannot decode {}.{}", pallet, entry)));
        }
        let value = match (pallet, entry) {
            (pallets::DID, "DidDocuments") => state.dids.get(&key).cloned(),
            (pallets::DID, "Institutions") => state.institutions.get(&key).cloned(),
            (pallets::CREDENTIAL, "Credentials") => state.credentials.get(&key).cloned(),
            (pallets::CREDENTIAL, "CredentialsByHolder") => state.by_holder.get(&key).map(|v| json!(v)),
            (pallets::CREDENTIAL, "CredentialsByIssuer") => state.by_issuer.get(&key).map(|v| json!(v)),
            (pallets::CREDENTIAL, "CredentialByHash") => state.by_hash.get(&key).map(|v| json!(v)),
            (pallets::REPUTATION, "ReputationScores") => state.scores.get(&key).cloned(),
            (pallets::REPUTATION, "EndorsementsGiven") => state.given.get(&key).map(|v| json!(v)),
            (pallets::REPUTATION, "EndorsementsReceived") => state.received.get(&key).map(|v| json!(v)),
            (pallets::SYSTEM, "Account") => state.balances.get(&key).map(|free| {
                json!({ "nonce": 0, "data": { "free": free, "reserved": 0, "frozen": 0 } })
            }),
            _ => None,
        };
        Ok(value)
    }

    async fn account_map_entries(
        &self,
        pallet: &str,
        entry: &str,
    ) -> Result<Vec<(String, Value)>, ChainError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(ChainError::Transport("connection refused".into()));
        }
        match (pallet, entry) {
            (pallets::DID, "Institutions") => Ok(state
                .institutions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn best_block_number(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(ChainError::Transport("connection refused".into()));
        }
        Ok(state.block)
    }

    async fn chain_info(&self) -> Result<ChainInfo, ChainError> {
        Ok(ChainInfo {
            genesis_hash: format!("0x{}", hex::encode([7u8; 32])),
            spec_version: 100,
            best_block: self.best_block_number().await?,
        })
    }

    async fn submit_and_watch(
        &self,
        call: ChainCall,
        signer: Keypair,
    ) -> Result<Submission, ChainError> {
        if self.state.lock().unwrap().offline {
            return Err(ChainError::Transport("connection refused".into()));
        }
        let who = address_of(&signer);
        let extrinsic_hash = format!("0x{}", hex::encode(hash_data(format!("{:?}{}", call, who).as_bytes())));

        if self.state.lock().unwrap().stall {
            return Ok(Submission {
                extrinsic_hash,
                events: stream::pending().boxed(),
            });
        }

        let outcome = self.execute(&who, &call);
        let block_hash = format!("0x{}", hex::encode(hash_data(&self.block().to_le_bytes())));
        let events = vec![
            Ok(TxEvent::Ready),
            Ok(TxEvent::InBlock {
                block_hash: block_hash.clone(),
            }),
            Ok(TxEvent::Finalized {
                block_hash,
                failure: outcome.err(),
            }),
        ];
        Ok(Submission {
            extrinsic_hash,
            events: stream::iter(events).boxed(),
        })
    }
}
