//! # chime-core
//!
//! Configuration model and persistence for the doorbell control plane.
//!
//! This crate provides:
//! - Data model types (CoreConfig, snapshots, save requests, apply status, scan results)
//! - The file-backed configuration store with validation
//! - `key=value` and `network={...}` file editing
//! - Atomic file replacement
//!
//! Everything here is synchronous and runtime agnostic. The web layer calls
//! into the store from blocking tasks.

pub mod config;
pub mod fsutil;
pub mod kv;
pub mod model;
pub mod wpa;

pub use config::{ConfigError, ConfigStore, SaveResult};
pub use model::*;
