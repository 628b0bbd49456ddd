// src/storage/mod.rs
//! Local persistence.

pub mod local_cache;
