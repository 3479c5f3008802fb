//! End-to-end pipeline through the cached directory, against in-memory
//! chain, metadata and store

use agent_cache_core::{KeyValueStore, ManualClock, MemoryStore, TtlCache};
use agent_discovery::{
    AgentDirectory, AgentMetadata, ChainHandle, DiscoveryConfig, DiscoveryError, MockChain,
    MockMetadata, Network, RawReputation, ReputationSummary,
};
use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
[[networks]]
network = "base-sepolia"
rpc_url = "http://localhost:8545"
identity_registry = "0x1111111111111111111111111111111111111111"
reputation_registry = "0x2222222222222222222222222222222222222222"
deploy_block = 0
chunk_size = 1000
min_token_id = 2
first_known_token_id = 2
blacklist = [5]

[retry]
max_attempts = 2
base_delay_ms = 10

[batch]
size = 2
delay_ms = 0

[cache]
list_ttl_secs = 300
agent_ttl_secs = 120

[relevance]
min_agent_number = 1
max_agent_number = 100
image_marker = "agentverse"
"#;

struct Fixture {
    directory: AgentDirectory<Arc<MemoryStore>>,
    chain: Arc<MockChain>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

fn owner() -> Address {
    Address::repeat_byte(0xaa)
}

fn metadata(name: &str, agent_number: Option<u64>, image: &str) -> AgentMetadata {
    AgentMetadata {
        name: name.to_string(),
        image: image.to_string(),
        agent_number,
        ..AgentMetadata::default()
    }
}

fn sample_chain() -> MockChain {
    MockChain::new(4_500)
        .with_mint(50, 1, owner(), "ipfs://1") // predates the application
        .with_mint(120, 2, owner(), "ipfs://2")
        .with_mint(1_500, 3, owner(), "ipfs://3") // another application's token
        .with_mint(2_200, 4, owner(), "ipfs://4")
        .with_mint(3_100, 5, owner(), "ipfs://5") // blacklisted
        .with_mint(4_400, 6, owner(), "ipfs://6")
        .with_reputation(2, RawReputation::Decimal { count: 3, value: 7_700, decimals: 2 })
        .with_reputation(4, RawReputation::Decimal { count: 1, value: 45, decimals: 0 })
        .with_failing_reputation(6)
}

fn sample_metadata() -> MockMetadata {
    MockMetadata::new()
        .with_document("ipfs://1", metadata("Genesis", Some(1), ""))
        .with_document("ipfs://2", metadata("Scout", Some(2), ""))
        .with_document("ipfs://3", metadata("Stranger", None, "https://elsewhere.example/3.png"))
        .with_document("ipfs://4", metadata("Oracle", None, "ipfs://agentverse/oracle.png"))
        .with_document("ipfs://5", metadata("Banned", Some(5), ""))
        .with_document("ipfs://6", metadata("Courier", Some(6), ""))
}

fn fixture(chain: MockChain) -> Fixture {
    let config = DiscoveryConfig::from_toml_str(CONFIG).unwrap();
    let chain = Arc::new(chain);
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let store = Arc::new(MemoryStore::default());

    let handle = ChainHandle::new(config.network(Network::BaseSepolia).unwrap().clone(), chain.clone());
    let cache = TtlCache::new(store.clone()).with_clock(clock.clone());
    let directory = AgentDirectory::new(&config, vec![handle], Arc::new(sample_metadata()), cache).unwrap();

    Fixture { directory, chain, clock, store }
}

#[tokio::test(start_paused = true)]
async fn test_list_agents_runs_full_pipeline() {
    let f = fixture(sample_chain());

    let listings = f.directory.list_agents(Network::BaseSepolia).await.unwrap();

    let summary: Vec<(u64, String, ReputationSummary)> = listings
        .iter()
        .map(|l| (l.agent.agent_id, l.agent.display_name(), l.reputation))
        .collect();
    assert_eq!(
        summary,
        vec![
            (2, "Scout".to_string(), ReputationSummary { count: 3, score: 77 }),
            (4, "Oracle".to_string(), ReputationSummary { count: 1, score: 45 }),
            // Reputation read failed; the agent is still listed
            (6, "Courier".to_string(), ReputationSummary::NONE),
        ]
    );
    assert!(listings.iter().all(|l| l.agent.owner == owner()));

    let stats = f.directory.stats();
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(stats.reputation_failures, 1);
    // Token 3 resolved but was not relevant; 1 and 5 were never resolved
    assert_eq!(stats.agents_resolved, 4);
}

#[tokio::test(start_paused = true)]
async fn test_second_call_is_served_from_cache() {
    let f = fixture(sample_chain());

    let first = f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    let queries = f.chain.log_query_count();
    let token_calls = f.chain.token_calls();

    let second = f.directory.list_agents(Network::BaseSepolia).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(f.chain.log_query_count(), queries);
    assert_eq!(f.chain.token_calls(), token_calls);
    assert_eq!(f.directory.stats().cache_hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_list_is_recomputed() {
    let f = fixture(sample_chain());

    f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    f.chain.reset_calls();

    f.clock.advance(Duration::from_secs(299));
    f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    assert_eq!(f.chain.log_query_count(), 0);

    f.clock.advance(Duration::from_secs(2));
    f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    assert!(f.chain.log_query_count() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_listing_bypasses_cache() {
    let f = fixture(sample_chain());

    f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    f.chain.reset_calls();

    let listings = f.directory.list_agents_fresh(Network::BaseSepolia).await.unwrap();
    assert_eq!(listings.len(), 3);
    assert!(f.chain.log_query_count() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_unreadable_head_is_not_cached() {
    // Both attempts of the first call fail, the second call succeeds
    let f = fixture(sample_chain().with_head_failures(2));

    let result = f.directory.list_agents(Network::BaseSepolia).await;
    assert!(matches!(result, Err(DiscoveryError::Chain(_))));

    let listings = f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    assert_eq!(listings.len(), 3);
    assert_eq!(f.directory.stats().cache_hits, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unconfigured_network_is_an_error() {
    let f = fixture(sample_chain());

    let result = f.directory.list_agents(Network::PolygonAmoy).await;
    assert!(matches!(result, Err(DiscoveryError::Config(_))));
}

#[tokio::test(start_paused = true)]
async fn test_get_agent() {
    let f = fixture(sample_chain());

    let listing = f.directory.get_agent(Network::BaseSepolia, 2).await.unwrap().unwrap();
    assert_eq!(listing.agent.display_name(), "Scout");
    assert_eq!(listing.reputation, ReputationSummary { count: 3, score: 77 });

    // Irrelevant, blacklisted, below minimum, nonexistent
    for id in [3, 5, 1, 99] {
        assert_eq!(f.directory.get_agent(Network::BaseSepolia, id).await.unwrap(), None, "agent {}", id);
    }

    let calls = f.chain.token_calls();
    let again = f.directory.get_agent(Network::BaseSepolia, 2).await.unwrap().unwrap();
    assert_eq!(again, listing);
    assert_eq!(f.chain.token_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_failed_reputation_is_not_cached() {
    let f = fixture(sample_chain());

    assert_eq!(
        f.directory.get_reputation(Network::BaseSepolia, 6).await.unwrap(),
        ReputationSummary::NONE
    );
    assert_eq!(
        f.directory.get_reputation(Network::BaseSepolia, 2).await.unwrap(),
        ReputationSummary { count: 3, score: 77 }
    );

    f.chain.reset_calls();
    f.directory.get_reputation(Network::BaseSepolia, 6).await.unwrap();
    f.directory.get_reputation(Network::BaseSepolia, 2).await.unwrap();
    // Only the failed read goes back to the chain, with its retry
    assert_eq!(f.chain.reputation_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_leaves_unrelated_keys() {
    let f = fixture(sample_chain());
    f.store.set("wallet:last-connector", "injected").unwrap();

    f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    f.directory.get_agent(Network::BaseSepolia, 2).await.unwrap();
    assert!(f.store.len() > 1);

    f.directory.invalidate(Some(Network::BaseSepolia));
    assert_eq!(f.store.keys().unwrap(), vec!["wallet:last-connector".to_string()]);

    f.chain.reset_calls();
    f.directory.list_agents(Network::BaseSepolia).await.unwrap();
    assert!(f.chain.log_query_count() > 0);
}
