//! vpp-probe - discover VPP instances and check that they answer.

mod commands;
mod output;

use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Discover VPP instances across Docker engines and the local host.
#[derive(Parser)]
#[command(name = "vpp-probe")]
#[command(about = "Discover and probe running VPP instances")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Docker Engine API URL (e.g. http://localhost:2375)
    #[arg(long, env = "DOCKER_HOST", global = true)]
    docker_host: Option<String>,

    /// Probe the VPP instance running on this host
    #[arg(long, global = true)]
    local: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover instances matching the filters
    Discover {
        /// Filter sets as KEY=VALUE[,KEY=VALUE...]; each set is queried separately
        filters: Vec<String>,
    },

    /// Print version info
    Version {
        /// Print only the version number
        #[arg(short, long)]
        short: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let docker_origin = match matches.value_source("docker_host") {
        Some(ValueSource::EnvVariable) => commands::HostOrigin::Environment,
        _ => commands::HostOrigin::Explicit,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    debug!(format = ?cli.format, "vpp-probe starting");

    match cli.command {
        Commands::Version { short } => {
            commands::version(short);
            Ok(())
        }
        Commands::Discover { ref filters } => {
            let config = commands::load_config(
                cli.config.as_deref(),
                cli.docker_host.as_deref(),
                cli.local,
            )
            .await?;
            commands::discover(&config, filters, cli.format, docker_origin).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_discover_with_filter_sets() {
        let cli = Cli::try_parse_from([
            "vpp-probe",
            "--local",
            "discover",
            "name=vpp1",
            "app=vpp,role=edge",
        ])
        .unwrap();

        assert!(cli.local);
        match cli.command {
            Commands::Discover { filters } => {
                assert_eq!(filters, vec!["name=vpp1", "app=vpp,role=edge"]);
            }
            Commands::Version { .. } => panic!("expected discover"),
        }
    }

    #[test]
    fn parses_short_version() {
        let cli = Cli::try_parse_from(["vpp-probe", "version", "-s"]).unwrap();
        assert!(matches!(cli.command, Commands::Version { short: true }));
    }
}
