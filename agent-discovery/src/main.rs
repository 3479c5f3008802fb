//! Agent Discovery CLI
//!
//! Lists the agents registered through this application on every configured
//! network, caching results on disk between runs.

use agent_cache_core::FileStore;
use anyhow::Context;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_discovery::cli::{self, Args, CacheCommands, Commands};
use agent_discovery::{AgentDirectory, DiscoveryConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args);

    let mut config = match DiscoveryConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }

    let store = FileStore::open(&config.cache.dir)
        .with_context(|| format!("Cannot open cache directory {}", config.cache.dir.display()))?;
    debug!(dir = %store.dir().display(), "Cache store opened");

    let directory = AgentDirectory::connect(&config, store)?;
    run(&args, &config, &directory).await?;

    if args.stats {
        let stats = directory.stats();
        if args.json {
            println!("{}", cli::to_json(&stats)?);
        } else {
            eprint!("{}", cli::render_stats(&stats));
        }
    }

    Ok(())
}

fn init_tracing(args: &Args) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("agent_discovery={},info", args.log_level).into());

    // Logs go to stderr so stdout stays clean for results
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(args: &Args, config: &DiscoveryConfig, directory: &AgentDirectory<FileStore>) -> anyhow::Result<()> {
    match &args.command {
        Commands::List { network, refresh } => {
            let listings = match (network, refresh) {
                (Some(network), false) => directory.list_agents(*network).await?,
                (Some(network), true) => directory.list_agents_fresh(*network).await?,
                (None, refresh) => {
                    if *refresh {
                        directory.invalidate(None);
                    }
                    directory.list_all_agents().await
                }
            };
            if args.json {
                println!("{}", cli::to_json(&listings)?);
            } else {
                print!("{}", cli::render_listings(&listings));
            }
        }

        Commands::Agent { id, network } => {
            let network = cli::pick_network(config, *network)?;
            match directory.get_agent(network, *id).await? {
                Some(listing) if args.json => println!("{}", cli::to_json(&listing)?),
                Some(listing) => print!("{}", cli::render_listing(&listing)),
                None => {
                    eprintln!("Agent #{} not found on {}", id, network);
                    std::process::exit(2);
                }
            }
        }

        Commands::Reputation { id, network } => {
            let network = cli::pick_network(config, *network)?;
            let reputation = directory.get_reputation(network, *id).await?;
            if args.json {
                println!("{}", cli::to_json(&reputation)?);
            } else {
                print!("{}", cli::render_reputation(network, *id, &reputation));
            }
        }

        Commands::Networks => {
            if args.json {
                let networks: Vec<_> = directory.networks().collect();
                println!("{}", cli::to_json(&networks)?);
            } else {
                print!("{}", cli::render_networks(directory.networks()));
            }
        }

        Commands::Cache(CacheCommands::Clear { network }) => {
            if let Some(network) = network {
                config.network(*network)?;
            }
            directory.invalidate(*network);
            eprintln!("Cache cleared");
        }
    }

    Ok(())
}
