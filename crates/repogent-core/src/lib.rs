//! # repogent-core
//!
//! Core types for the Repogent bot-automation layer.
//!
//! Every agent run is a separate short-lived process. Nothing here holds
//! state between invocations; the shared state lives on disk and is owned
//! by `repogent-orchestrator`.
//!
//! ## Contents
//!
//! - [`RepogentError`] and the crate-wide [`Result`] alias
//! - [`RepogentConfig`] loaded from `.repogent/config.toml`
//! - Agent, priority and control-message enums shared by every crate
//! - Identifier validation for values that end up in paths or URLs
//! - Fail-open helpers for advisory work

mod config;
mod error;
pub mod fail_open;
mod types;
mod validate;

pub use config::{
    HttpConfig, LimitsConfig, ModelConfig, RepogentConfig, RoutingConfig, StorageConfig,
};
pub use error::{RepogentError, Result};
pub use types::*;
pub use validate::{positive_id_from_json, validate_positive_id, RepoId};
