//! # vprobe-core
//!
//! Core types and traits for discovering VPP instances across environments
//! and controlling them through one uniform contract.
//!
//! ## Modules
//!
//! - [`error`] - Error type shared by every crate in the workspace
//! - [`config`] - Probe configuration with validation
//! - [`query`] - Free-form discovery filters
//! - [`types`] - Environment kinds, metadata keys and well-known endpoints
//! - [`exec`] - One-shot remote command builder
//! - [`console`] - Interactive console access
//! - [`control`] - Cached control connection and the default TCP connector
//! - [`handler`] - The per-instance remote-control contract
//! - [`provider`] - Environment provider contract
//! - [`instance`] - Probed, ready-to-use instances

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod exec;
pub mod handler;
pub mod instance;
pub mod provider;
pub mod query;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use handler::{HandlerSettings, InstanceHandler};
pub use instance::Instance;
pub use provider::Provider;
pub use query::QueryParams;
pub use types::{EnvKind, Metadata};
