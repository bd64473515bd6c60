use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;

use takara_common::block::Block;
use takara_common::crypto::{KeyPair, SecretKey};
use takara_daemon::config::NodeConfig;
use takara_daemon::network::block_loader::BlockLoaderService;
use takara_daemon::network::tcp::{TcpBlockLoader, TcpYacNetwork, TransportServer};
use takara_daemon::node::Node;
use takara_daemon::storage::kv::SledBackend;
use takara_daemon::storage::restorer;
use takara_daemon::storage::storage::insert_genesis;
use takara_daemon::storage::SledBlockStore;

#[derive(Parser)]
#[command(name = "takarad", about = "Takara Network permissioned ledger daemon")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "takarad.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = NodeConfig::load(&args.config)?;

    let secret = SecretKey::from_hex(&config.secret_key).context("parsing secret key")?;
    let keypair = Arc::new(KeyPair::from_secret(&secret));
    info!("peer identity {}", keypair.public_key());

    let backend = Arc::new(SledBackend::open(&config.database_path)?);
    let block_store = Box::new(SledBlockStore::open(&config.block_store_path)?);

    let network = Arc::new(TcpYacNetwork::default());
    let block_loader = Arc::new(TcpBlockLoader::new());

    let node = Node::build(
        &config,
        keypair,
        backend,
        block_store,
        network,
        block_loader.clone(),
    )?;

    if node.storage.top_height()? == 0 {
        if let Some(genesis_path) = &config.genesis_path {
            let content = std::fs::read_to_string(genesis_path)
                .with_context(|| format!("reading genesis {}", genesis_path.display()))?;
            let genesis: Block = serde_json::from_str(&content).context("parsing genesis")?;
            insert_genesis(&node.storage, &genesis)?;
            info!("genesis block {} applied", genesis.hash());
        } else {
            warn!("starting with an empty chain and no genesis block");
        }
    } else if restorer::needs_restoration(&node.storage)? {
        info!("world state is behind the block store, restoring");
        restorer::restore_wsv(&node.storage)?;
    }

    if let Ok(peers) = node.storage.peers(false) {
        block_loader.update_peers(&peers);
    }

    let listener = TcpListener::bind(&config.listen_address)
        .await
        .with_context(|| format!("binding {}", config.listen_address))?;
    let loader_service = Arc::new(BlockLoaderService::new(
        node.storage.clone(),
        node.result_cache.clone(),
    ));
    let (server, votes) = TransportServer::new(loader_service);
    tokio::spawn(Arc::new(server).serve(listener));
    node.spawn_vote_pump(votes);

    node.start();
    info!("takarad is up at {}", config.listen_address);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    node.stop();
    Ok(())
}
