//! Integration tests for parsing Docker Engine API data.
//!
//! These tests validate that the vprobe-docker models deserialize real
//! engine responses and that handlers derive their identity from them.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vprobe_core::control::TcpConnector;
use vprobe_core::handler::HandlerSettings;
use vprobe_core::InstanceHandler;
use vprobe_docker::models::{ContainerInspect, ContainerSummary};
use vprobe_docker::{ContainerHandler, DockerClient};

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn load_fixture(name: &str) -> String {
    let fixture_path = fixtures_dir().join(name);
    fs::read_to_string(&fixture_path).unwrap_or_else(|e| {
        panic!(
            "Failed to read fixture at {}: {}",
            fixture_path.display(),
            e
        )
    })
}

#[test]
fn test_deserialize_container_list() {
    let json_data = load_fixture("container_list.json");

    let containers: Vec<ContainerSummary> = serde_json::from_str(&json_data)
        .unwrap_or_else(|e| panic!("Failed to deserialize container list: {}", e));

    assert_eq!(containers.len(), 2, "Expected 2 containers in test data");
    assert_eq!(containers[0].names, vec!["/vpp1"]);
    assert_eq!(containers[1].state.as_deref(), Some("running"));
    let labels = containers[1].labels.as_ref().expect("labels present");
    assert_eq!(labels["role"], "edge");
}

#[test]
fn test_deserialize_container_inspect() {
    let json_data = load_fixture("container_inspect.json");

    let container: ContainerInspect = serde_json::from_str(&json_data)
        .unwrap_or_else(|e| panic!("Failed to deserialize container inspect: {}", e));

    assert_eq!(container.display_name(), "vpp1");
    assert_eq!(container.image(), "ligato/vpp-base:24.02");
    assert_eq!(container.ip_address(), Some("172.17.0.2"));
    let state = container.state.as_ref().expect("state present");
    assert!(state.running);
    assert_eq!(state.pid, Some(48211));
}

#[test]
fn test_handler_from_inspect_fixture() {
    let json_data = load_fixture("container_inspect.json");
    let container: ContainerInspect = serde_json::from_str(&json_data).unwrap();

    let client = DockerClient::new("http://localhost:2375").unwrap();
    let settings = HandlerSettings::new(Arc::new(TcpConnector::new(Duration::from_secs(1))));
    let handler = ContainerHandler::new(client, container, &settings);

    assert_eq!(handler.id(), "vpp1-4f2a91c");
    let metadata = handler.metadata();
    assert_eq!(metadata["id"], "4f2a91c0e7d3");
    assert_eq!(metadata["created"], "Fri Mar  1 10:00:00 UTC 2024");
    assert_eq!(
        handler.control_addr().unwrap().to_string(),
        "172.17.0.2:9191"
    );
}
