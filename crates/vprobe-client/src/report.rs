//! Per-run discovery diagnostics.

use serde::Serialize;
use vprobe_core::EnvKind;

/// Outcome of one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    /// One entry per provider, in registration order.
    pub providers: Vec<ProviderReport>,
    /// Handlers discarded because their liveness probe failed.
    pub dropped: Vec<DroppedHandler>,
}

/// What one provider contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
    /// Provider name.
    pub name: String,
    /// Environment kind.
    pub env: EnvKind,
    /// Instances that passed the probe.
    pub instances: usize,
    /// Query failure, if the provider failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A handler dropped during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedHandler {
    /// Provider that returned the handler.
    pub provider: String,
    /// Handler identifier.
    pub id: String,
    /// Probe failure.
    pub error: String,
}

impl DiscoveryReport {
    /// Total instances discovered.
    #[must_use]
    pub fn total_instances(&self) -> usize {
        self.providers.iter().map(|p| p.instances).sum()
    }

    /// Providers whose query failed.
    pub fn failed_providers(&self) -> impl Iterator<Item = &ProviderReport> {
        self.providers.iter().filter(|p| p.error.is_some())
    }

    /// True if any provider failed or any handler was dropped.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.dropped.is_empty() || self.failed_providers().next().is_some()
    }
}
