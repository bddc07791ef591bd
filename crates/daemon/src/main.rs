/// dirnet daemon
///
/// Runs a directory node: joins the gossip room, serves the JSON-RPC API
/// and replicates writes to peers. Exits non-zero when the node loses the
/// network so a supervisor can restart it.

use anyhow::{Context, Result};
use clap::Parser;
use dirnet_common::DaemonConfig;
use dirnet_core::{DirectoryNode, ReplicationError};
use dirnet_daemon::{AppState, RpcServer};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dirnet-daemon", version, about = "Replicated directory node")]
struct Cli {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive (overrides config)
    #[arg(long)]
    log: Option<String>,

    /// RPC server address
    #[arg(long)]
    hostname: Option<String>,

    /// RPC server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory backend (default, memory)
    #[arg(long)]
    directory_type: Option<String>,

    /// Comma separated `host:port` peers to dial on startup
    #[arg(long)]
    p2p_bootstrap: Option<String>,

    /// Gossip room name
    #[arg(long)]
    p2p_room: Option<String>,

    /// UDP port of the gossip mesh
    #[arg(long)]
    p2p_listen_port: Option<u16>,

    /// Hex encoded 32 byte node key seed
    #[arg(long, env = "DIRNET_P2P_SEED")]
    p2p_seed: Option<String>,

    /// TOML file with namespace policies
    #[arg(long)]
    policy: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => DaemonConfig::default(),
        };

        if let Some(level) = &self.log {
            config.log.level = level.clone();
        }
        if let Some(hostname) = &self.hostname {
            config.server.hostname = hostname.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(backend) = &self.directory_type {
            config.directory.backend = backend.clone();
        }
        if let Some(bootstrap) = &self.p2p_bootstrap {
            config.p2p.bootstrap = bootstrap.clone();
        }
        if let Some(room) = &self.p2p_room {
            config.p2p.room = room.clone();
        }
        if let Some(port) = self.p2p_listen_port {
            config.p2p.listen_port = port;
        }
        if let Some(seed) = &self.p2p_seed {
            config.p2p.seed = Some(seed.clone());
        }
        if let Some(policy) = &self.policy {
            config.policy.file = Some(policy.clone());
        }

        Ok(config)
    }
}

fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn rpc_addr(config: &DaemonConfig) -> Result<SocketAddr> {
    (config.server.hostname.as_str(), config.server.port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid RPC address {}", config.server.hostname))?
        .next()
        .with_context(|| format!("No address for {}", config.server.hostname))
}

/// Resolves on SIGINT or SIGTERM
async fn stop_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run(config: DaemonConfig) -> Result<()> {
    let addr = rpc_addr(&config)?;
    let node = DirectoryNode::new(config).await?;

    let state = AppState {
        node_id: node.node_id(),
        api: node.service(),
        store: node.store(),
    };
    let server = RpcServer::bind(addr, state).await?;

    let mut shutdown = node.subscribe_shutdown();
    let (server_done, server_exited) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = server
            .serve(async move {
                let _ = shutdown.wait_for(|stopped| *stopped).await;
            })
            .await;
        let _ = server_done.send(());
        result
    });

    info!("Directory started: http://{}/rpc", addr);

    // The node never outlives the RPC server
    let stop = async move {
        tokio::select! {
            _ = stop_signal() => {}
            _ = server_exited => warn!("RPC server exited, stopping node"),
        }
    };
    let result = node.run(stop).await;

    let served = match server.await {
        Ok(served) => served,
        Err(e) => Err(anyhow::anyhow!("RPC server task failed: {}", e)),
    };

    result.and(served)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(2);
        }
    };

    setup_tracing(&config.log.level);
    info!("Starting dirnet daemon v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config).await {
        match e.downcast_ref::<ReplicationError>() {
            Some(partition) if partition.is_partition() => {
                error!("Lost the network, exiting: {}", partition);
            }
            _ => error!("{:#}", e),
        }
        std::process::exit(1);
    }

    info!("dirnet daemon exited");
}
