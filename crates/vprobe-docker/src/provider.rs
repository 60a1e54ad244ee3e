//! Docker environment provider.

use crate::client::{DockerClient, DockerClientBuilder};
use crate::handler::ContainerHandler;
use crate::models::{ContainerListParams, ContainerSummary};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::debug;
use vprobe_core::config::DockerConfig;
use vprobe_core::handler::HandlerSettings;
use vprobe_core::{EnvKind, Error, InstanceHandler, Provider, QueryParams};

/// Discovers instances among the running containers of one engine.
pub struct DockerProvider {
    name: String,
    client: DockerClient,
    settings: HandlerSettings,
}

impl DockerProvider {
    /// Create a provider over an existing client.
    #[must_use]
    pub fn new(name: impl Into<String>, client: DockerClient, settings: HandlerSettings) -> Self {
        Self {
            name: name.into(),
            client,
            settings,
        }
    }

    /// Create a provider from the Docker section of the probe configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the engine URL is not usable.
    pub fn from_config(config: &DockerConfig, settings: HandlerSettings) -> Result<Self> {
        let client = DockerClientBuilder::from_config(config)?.build()?;
        Ok(Self::new(config.name.clone(), client, settings))
    }

    /// The engine client.
    #[must_use]
    pub fn client(&self) -> &DockerClient {
        &self.client
    }

    async fn list_matching(&self, params: &[QueryParams]) -> Result<Vec<ContainerSummary>> {
        if params.is_empty() {
            return self.client.list_containers(&ContainerListParams::default()).await;
        }

        let mut seen = HashSet::new();
        let mut containers = Vec::new();
        for query in params {
            let list = ContainerListParams::from_query(query);
            for container in self.client.list_containers(&list).await? {
                if seen.insert(container.id.clone()) {
                    containers.push(container);
                }
            }
        }
        Ok(containers)
    }
}

#[async_trait]
impl Provider for DockerProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn env(&self) -> EnvKind {
        EnvKind::Docker
    }

    async fn query(&self, params: &[QueryParams]) -> Result<Vec<Box<dyn InstanceHandler>>> {
        let containers = self.list_matching(params).await?;
        debug!(provider = %self.name, count = containers.len(), "containers matched");

        let mut handlers: Vec<Box<dyn InstanceHandler>> = Vec::with_capacity(containers.len());
        for summary in containers {
            let container = match self.client.inspect_container(&summary.id).await {
                Ok(container) => container,
                Err(Error::NotFound(msg)) => {
                    debug!(provider = %self.name, container = %summary.id, "container vanished: {msg}");
                    continue;
                }
                Err(err) => return Err(err),
            };
            handlers.push(Box::new(ContainerHandler::new(
                self.client.clone(),
                container,
                &self.settings,
            )));
        }
        Ok(handlers)
    }
}
