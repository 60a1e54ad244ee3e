//! Docker environment support for VPP instance discovery.
//!
//! This crate talks to the Docker Engine HTTP API to enumerate running
//! containers, run commands inside them through exec instances and locate
//! their control endpoints.

#![deny(missing_docs)]

pub mod client;
pub mod handler;
pub mod models;
pub mod provider;
pub mod stream;

pub use client::{DockerClient, DockerClientBuilder};
pub use handler::ContainerHandler;
pub use models::{ContainerInspect, ContainerListParams, ContainerSummary};
pub use provider::DockerProvider;

/// Convenient result alias matching the shared probe error type.
pub type Result<T> = vprobe_core::Result<T>;
