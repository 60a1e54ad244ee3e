//! Subcommand implementations.

use crate::output::{self, DiscoveryOutput, InstanceSummary, OutputFormat};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use vprobe_client::Client;
use vprobe_core::config::{DockerConfig, ProbeConfig};
use vprobe_core::handler::HandlerSettings;
use vprobe_core::QueryParams;
use vprobe_docker::DockerProvider;
use vprobe_local::LocalProvider;

/// Print version info.
pub fn version(short: bool) {
    if short {
        println!("{}", env!("CARGO_PKG_VERSION"));
    } else {
        println!(
            "vpp-probe {} ({})",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_NAME")
        );
    }
}

/// Merge the configuration file with command-line overrides.
pub async fn load_config(
    path: Option<&Path>,
    docker_host: Option<&str>,
    local: bool,
) -> anyhow::Result<ProbeConfig> {
    let mut config = match path {
        Some(path) => ProbeConfig::from_file(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProbeConfig::new(),
    };

    if let Some(host) = docker_host {
        let docker = match config.docker.take() {
            Some(existing) => DockerConfig::new(host)?
                .with_name(existing.name)
                .with_timeout(existing.request_timeout_secs),
            None => DockerConfig::new(host)?,
        };
        config = config.with_docker(docker);
    }
    if local {
        config = config.with_local(true);
    }

    if config.has_no_environment() {
        anyhow::bail!("No environment selected: pass --docker-host, --local or a config file");
    }
    Ok(config)
}

/// Where the Docker host setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOrigin {
    /// Command-line flag or configuration file.
    Explicit,
    /// Inherited `DOCKER_HOST`.
    Environment,
}

/// Register one provider per configured environment.
///
/// A Docker host inherited from the environment that cannot be served is
/// skipped with a warning; an explicit one fails the setup.
pub fn build_client(config: &ProbeConfig, docker_origin: HostOrigin) -> anyhow::Result<Client> {
    let settings = HandlerSettings::from_config(config);
    let mut client = Client::new().with_probe_command(&config.probe_command);

    if let Some(docker) = &config.docker {
        match DockerProvider::from_config(docker, settings.clone()) {
            Ok(provider) => client.add_provider(Arc::new(provider))?,
            Err(err) if docker_origin == HostOrigin::Environment => {
                warn!(host = %docker.host, "skipping Docker provider from DOCKER_HOST: {err}");
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("setting up Docker provider for {}", docker.host)))
            }
        }
    }
    if config.local {
        client.add_provider(Arc::new(LocalProvider::new(settings)))?;
    }
    Ok(client)
}

/// Parse `KEY=VALUE[,KEY=VALUE...]` filter sets.
pub fn parse_filters(filters: &[String]) -> anyhow::Result<Vec<QueryParams>> {
    filters
        .iter()
        .map(|filter| {
            filter
                .parse::<QueryParams>()
                .with_context(|| format!("invalid filter `{filter}`"))
        })
        .collect()
}

/// Run discovery and print the instances found.
pub async fn discover(
    config: &ProbeConfig,
    filters: &[String],
    format: OutputFormat,
    docker_origin: HostOrigin,
) -> anyhow::Result<()> {
    let params = parse_filters(filters)?;
    let client = build_client(config, docker_origin)?;

    let result = client.discover_instances(&params).await;
    let instances = client.instances();
    if let Err(err) = result {
        if let Some(report) = client.last_report() {
            output::print_discovery(
                &DiscoveryOutput {
                    instances: Vec::new(),
                    report,
                },
                format,
            );
        }
        return Err(err.into());
    }

    let report = client.last_report().unwrap_or_default();
    info!(instances = instances.len(), "discovery complete");
    output::print_discovery(
        &DiscoveryOutput {
            instances: instances.iter().map(|i| InstanceSummary::from(i.as_ref())).collect(),
            report,
        },
        format,
    );

    client.close().await?;
    Ok(())
}
