//! Shipped example configuration

use agent_discovery::{DiscoveryConfig, Network, ReputationSchema};
use std::path::Path;
use std::time::Duration;

fn example_path() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("discovery.example.toml")
}

#[test]
fn test_example_config_loads() {
    let config = DiscoveryConfig::load(example_path()).unwrap();

    assert_eq!(config.networks.len(), 3);

    let amoy = config.network(Network::PolygonAmoy).unwrap();
    assert_eq!(amoy.chunk_size(), 1_000);
    assert_eq!(amoy.reputation_schema(), ReputationSchema::Legacy);
    assert_eq!(amoy.first_known_token_id, None);

    let base = config.network(Network::BaseSepolia).unwrap();
    assert_eq!(base.chunk_size(), 10_000);
    assert_eq!(base.reputation_schema(), ReputationSchema::Decimal);

    assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
    assert_eq!(config.batch.delay(), Duration::from_millis(200));
    assert_eq!(config.relevance.image_marker.as_deref(), Some("agentverse"));
}

#[test]
fn test_missing_file_is_config_error() {
    let err = DiscoveryConfig::load("/nonexistent/discovery.toml").unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
fn test_invalid_relevance_rule_is_rejected() {
    let raw = std::fs::read_to_string(example_path()).unwrap();
    let raw = raw.replace("min_agent_number = 1", "min_agent_number = 10\nmax_agent_number = 5");
    assert!(DiscoveryConfig::from_toml_str(&raw).is_err());
}
