//! Discovery client.

use crate::report::{DiscoveryReport, DroppedHandler, ProviderReport};
use crate::Result;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vprobe_core::types::DEFAULT_PROBE_COMMAND;
use vprobe_core::{Error, Instance, Provider, QueryParams};

/// Snapshot of the instance set.
pub type Instances = Arc<Vec<Arc<Instance>>>;

/// Owns the registered providers and the instances of the latest discovery.
///
/// Discovery queries every provider concurrently and replaces the instance
/// set wholesale. Readers holding an earlier [`Instances`] snapshot keep a
/// consistent view.
pub struct Client {
    providers: Vec<Arc<dyn Provider>>,
    instances: RwLock<Instances>,
    last_report: RwLock<Option<DiscoveryReport>>,
    probe_command: Arc<str>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with no providers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            instances: RwLock::new(Arc::default()),
            last_report: RwLock::new(None),
            probe_command: Arc::from(DEFAULT_PROBE_COMMAND),
        }
    }

    /// Set the console command used as liveness probe.
    #[must_use]
    pub fn with_probe_command(mut self, command: impl AsRef<str>) -> Self {
        self.probe_command = Arc::from(command.as_ref());
        self
    }

    /// Register a provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateProvider`] if a provider with the same name
    /// is already registered; the provider list is left unchanged.
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) -> Result<()> {
        if self.providers.iter().any(|p| p.name() == provider.name()) {
            return Err(Error::DuplicateProvider(provider.name().to_string()));
        }
        debug!(provider = %provider.name(), env = %provider.env(), "provider added");
        self.providers.push(provider);
        Ok(())
    }

    /// Registered providers in registration order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// The current instance set.
    #[must_use]
    pub fn instances(&self) -> Instances {
        let guard = self.instances.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Report of the latest discovery run, successful or not.
    #[must_use]
    pub fn last_report(&self) -> Option<DiscoveryReport> {
        self.last_report
            .read()
            .map(|report| report.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Discover live instances across all providers.
    ///
    /// Every provider is queried in its own task and every returned handler
    /// is probed. Failing providers and handlers are logged and skipped.
    /// Instances keep their provider's order; providers contribute in
    /// registration order.
    ///
    /// The previous instance set is replaced but not closed: [`Client::close`]
    /// only reaches the current set. Handlers of an earlier [`Instances`]
    /// snapshot are released when its last reference drops; callers that
    /// need them closed earlier must close them through the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoProviders`] before any query when no provider is
    /// registered, and [`Error::NoInstances`] when no live instance was
    /// found. In the latter case the instance set is still replaced.
    pub async fn discover_instances(&self, params: &[QueryParams]) -> Result<DiscoveryReport> {
        if self.providers.is_empty() {
            return Err(Error::NoProviders);
        }

        let params: Arc<[QueryParams]> = Arc::from(params);
        let (tx, mut rx) = mpsc::channel(self.providers.len());

        for (index, provider) in self.providers.iter().enumerate() {
            let tx = tx.clone();
            let provider = Arc::clone(provider);
            let params = Arc::clone(&params);
            let probe_command = Arc::clone(&self.probe_command);

            tokio::spawn(async move {
                let outcome = discover_provider(provider.as_ref(), &params, &probe_command).await;
                if tx.send((index, outcome)).await.is_err() {
                    debug!(provider = %provider.name(), "discovery abandoned");
                }
            });
        }
        drop(tx);

        let mut outcomes: Vec<Option<ProviderOutcome>> =
            self.providers.iter().map(|_| None).collect();
        while let Some((index, outcome)) = rx.recv().await {
            outcomes[index] = Some(outcome);
        }

        let mut report = DiscoveryReport::default();
        let mut instances = Vec::new();
        for (provider, outcome) in self.providers.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                warn!(provider = %provider.name(), "discovery task ended without a result");
                ProviderOutcome::failed(Error::InternalError(
                    "discovery task panicked".to_string(),
                ))
            });

            report.providers.push(ProviderReport {
                name: provider.name().to_string(),
                env: provider.env(),
                instances: outcome.instances.len(),
                error: outcome.error.map(|err| err.to_string()),
            });
            report.dropped.extend(outcome.dropped);
            instances.extend(outcome.instances);
        }

        let found = instances.len();
        self.replace_instances(instances);
        self.record_report(report.clone());

        if found == 0 {
            let failed = report.failed_providers().count();
            return Err(Error::NoInstances(format!(
                "{} providers queried, {failed} failed, {} handlers dropped",
                report.providers.len(),
                report.dropped.len()
            )));
        }

        info!(
            instances = found,
            providers = report.providers.len(),
            "discovery finished"
        );
        Ok(report)
    }

    /// Close the handler of every current instance.
    ///
    /// Close failures are logged and never returned.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the handler contract.
    pub async fn close(&self) -> Result<()> {
        let instances = self.instances();
        for instance in instances.iter() {
            if let Err(err) = instance.handler().close().await {
                debug!(instance = %instance.id(), "closing handler failed: {err}");
            }
        }
        Ok(())
    }

    fn replace_instances(&self, instances: Vec<Arc<Instance>>) {
        let mut guard = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(instances);
    }

    fn record_report(&self, report: DiscoveryReport) {
        let mut guard = self
            .last_report
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(report);
    }
}

struct ProviderOutcome {
    instances: Vec<Arc<Instance>>,
    dropped: Vec<DroppedHandler>,
    error: Option<Error>,
}

impl ProviderOutcome {
    fn failed(error: Error) -> Self {
        Self {
            instances: Vec::new(),
            dropped: Vec::new(),
            error: Some(error),
        }
    }
}

async fn discover_provider(
    provider: &dyn Provider,
    params: &[QueryParams],
    probe_command: &str,
) -> ProviderOutcome {
    let handlers = match provider.query(params).await {
        Ok(handlers) => handlers,
        Err(err) => {
            warn!(provider = %provider.name(), "provider discover error: {err}");
            return ProviderOutcome::failed(err);
        }
    };

    let mut instances = Vec::with_capacity(handlers.len());
    let mut dropped = Vec::new();
    for handler in handlers {
        let id = handler.id();
        match Instance::new(handler, probe_command).await {
            Ok(instance) => instances.push(Arc::new(instance)),
            Err(err) => {
                debug!(instance = %id, "vpp instance init failed: {err}");
                dropped.push(DroppedHandler {
                    provider: provider.name().to_string(),
                    id,
                    error: err.to_string(),
                });
            }
        }
    }

    ProviderOutcome {
        instances,
        dropped,
        error: None,
    }
}
