//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use vprobe_client::DiscoveryReport;
use vprobe_core::Instance;

/// Output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One discovered instance as printed.
#[derive(Debug, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub version: String,
    pub metadata: BTreeMap<String, String>,
}

impl From<&Instance> for InstanceSummary {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id(),
            version: instance.version().to_string(),
            metadata: instance.metadata(),
        }
    }
}

/// Discovery result as printed.
#[derive(Debug, Serialize)]
pub struct DiscoveryOutput {
    pub instances: Vec<InstanceSummary>,
    pub report: DiscoveryReport,
}

/// Print a discovery result in the specified format.
pub fn print_discovery(output: &DiscoveryOutput, format: OutputFormat) {
    match format {
        OutputFormat::Text => print_text(output),
        OutputFormat::Json => match serde_json::to_string_pretty(output) {
            Ok(json) => println!("{json}"),
            Err(_) => print_text(output),
        },
    }
}

fn print_text(output: &DiscoveryOutput) {
    println!("{} instance(s) discovered", output.instances.len());
    for instance in &output.instances {
        print_divider();
        println!("{}", instance.id);
        print_row("version", &instance.version);
        for (key, value) in &instance.metadata {
            print_row(key, value);
        }
    }

    for provider in output.report.failed_providers() {
        eprintln!(
            "provider {} ({}) failed: {}",
            provider.name,
            provider.env,
            provider.error.as_deref().unwrap_or_default()
        );
    }
    for dropped in &output.report.dropped {
        eprintln!(
            "instance {} from {} dropped: {}",
            dropped.id, dropped.provider, dropped.error
        );
    }
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<16} {}", format!("{label}:"), value);
}

/// Print a divider line.
pub fn print_divider() {
    println!("{}", "-".repeat(50));
}

#[cfg(test)]
mod tests {
    use super::*;
    use vprobe_client::ProviderReport;
    use vprobe_core::EnvKind;

    #[test]
    fn json_output_shape() {
        let output = DiscoveryOutput {
            instances: vec![InstanceSummary {
                id: "vpp1-4f2a91c".to_string(),
                version: "vpp v24.02-release".to_string(),
                metadata: BTreeMap::from([("env".to_string(), "docker".to_string())]),
            }],
            report: DiscoveryReport {
                providers: vec![ProviderReport {
                    name: "docker".to_string(),
                    env: EnvKind::Docker,
                    instances: 1,
                    error: None,
                }],
                dropped: Vec::new(),
            },
        };

        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["instances"][0]["id"], "vpp1-4f2a91c");
        assert_eq!(value["instances"][0]["metadata"]["env"], "docker");
        assert_eq!(value["report"]["providers"][0]["instances"], 1);
    }
}
