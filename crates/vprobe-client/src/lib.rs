//! Concurrent discovery of VPP instances across environment providers.
//!
//! A [`Client`] owns an ordered set of providers and the instances found by
//! the latest discovery run, together with a [`DiscoveryReport`] describing
//! what each provider contributed.

#![deny(missing_docs)]

pub mod client;
pub mod report;

pub use client::{Client, Instances};
pub use report::{DiscoveryReport, DroppedHandler, ProviderReport};

/// Convenient result alias matching the shared probe error type.
pub type Result<T> = vprobe_core::Result<T>;
