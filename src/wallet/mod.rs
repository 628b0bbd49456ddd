// src/wallet/mod.rs
//! Signing keys and locally held credential requests.

pub mod credential_storage;
pub mod key_management;
