//! Local-host environment support for VPP instance discovery.
//!
//! The host itself is the only candidate instance. Commands run through a
//! local shell and the control endpoint is reached over loopback.

#![deny(missing_docs)]

pub mod exec;
pub mod handler;
pub mod provider;

pub use exec::ShellExec;
pub use handler::LocalHandler;
pub use provider::LocalProvider;

/// Convenient result alias matching the shared probe error type.
pub type Result<T> = vprobe_core::Result<T>;
