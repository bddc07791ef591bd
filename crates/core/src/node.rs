/// Directory node runtime
///
/// Owns every long-lived piece of a node: the store, the policy registry
/// and its watcher, the gossip session and the request service. `run`
/// drives the background tasks until a stop is requested or the replicator
/// reports a partition.

use crate::identity::KeyPair;
use crate::p2p::{GossipInbox, GossipNetwork, QuicGossip, QuicGossipConfig};
use crate::policy::{PolicyRegistry, PolicyWatcher};
use crate::replication::{Replicator, ReplicatorConfig};
use crate::service::DirectoryService;
use crate::store::{open_store, DirectoryStore};
use anyhow::{Context, Result};
use dirnet_common::{DaemonConfig, NodeId};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct DirectoryNode {
    node_id: NodeId,
    config: DaemonConfig,
    store: Arc<dyn DirectoryStore>,
    service: Arc<DirectoryService>,
    replicator: Replicator,
    watcher: Option<PolicyWatcher>,
    shutdown: watch::Sender<bool>,
}

impl DirectoryNode {
    /// Build a node that joins the QUIC gossip mesh
    pub async fn new(config: DaemonConfig) -> Result<Self> {
        info!("Initializing directory node...");

        let replicator_config = ReplicatorConfig::from(&config.p2p);
        replicator_config
            .validate()
            .context("Invalid p2p configuration")?;

        let keypair = match &config.p2p.seed {
            Some(seed) => KeyPair::from_seed_hex(seed).context("Invalid p2p seed")?,
            None => KeyPair::generate(),
        };

        let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.p2p.listen_port));
        let (gossip, inbox) = QuicGossip::join(QuicGossipConfig {
            bind_addr,
            bootstrap: replicator_config.bootstrap.clone(),
            room: replicator_config.room.clone(),
            local_id: keypair.node_id(),
        })
        .await
        .context("Failed to join gossip room")?;

        Self::with_network(config, Arc::new(gossip), inbox).await
    }

    /// Build a node on an already joined gossip room
    pub async fn with_network(
        config: DaemonConfig,
        network: Arc<dyn GossipNetwork>,
        inbox: GossipInbox,
    ) -> Result<Self> {
        let node_id = network.local_id();
        info!("Node ID: {}", node_id);

        let store = open_store(&config.directory.backend).context("Failed to open store")?;

        let policies = PolicyRegistry::empty();
        let watcher = match &config.policy.file {
            Some(path) => {
                let mut watcher = PolicyWatcher::new(
                    path.clone(),
                    policies.clone(),
                    config.policy_reload_interval(),
                );
                watcher
                    .load()
                    .await
                    .with_context(|| format!("Failed to load policy file {:?}", path))?;
                Some(watcher)
            }
            None => {
                warn!("No policy file configured, every namespace is unmanaged");
                None
            }
        };

        let replicator = Replicator::new(
            &ReplicatorConfig::from(&config.p2p),
            network,
            inbox,
            Some(store.clone()),
        )?;

        let service = Arc::new(
            DirectoryService::new(policies)
                .with_store(store.clone())
                .with_replication(Arc::new(replicator.handle())),
        );

        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            node_id,
            config,
            store,
            service,
            replicator,
            watcher,
            shutdown,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn service(&self) -> Arc<DirectoryService> {
        self.service.clone()
    }

    pub fn store(&self) -> Arc<dyn DirectoryStore> {
        self.store.clone()
    }

    /// Receiver flipped to `true` when the node stops for any reason
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run until `stop` resolves or the node is partitioned
    ///
    /// A partition is returned as an error wrapping
    /// [`crate::replication::ReplicationError::PartitionTimeout`].
    pub async fn run<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self {
            store,
            replicator,
            watcher,
            shutdown,
            config,
            ..
        } = self;

        let mut tasks = Vec::new();
        if let Some(watcher) = watcher {
            tasks.push(tokio::spawn(watcher.run(shutdown.subscribe())));
        }
        tasks.push(spawn_cleanup(
            store,
            config.cleanup_interval(),
            shutdown.subscribe(),
        ));

        let mut replication = tokio::spawn(replicator.run(shutdown.subscribe()));
        info!("Directory node running");

        let outcome = tokio::select! {
            _ = stop => {
                info!("Stop requested");
                shutdown.send_replace(true);
                (&mut replication).await
            }
            finished = &mut replication => finished,
        };

        shutdown.send_replace(true);
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        match outcome {
            Ok(Ok(())) => {
                info!("Directory node stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Replication stopped: {}", e);
                Err(e.into())
            }
            Err(e) => Err(anyhow::anyhow!("Replication task failed: {}", e)),
        }
    }
}

/// Periodically drop expired entries
fn spawn_cleanup(
    store: Arc<dyn DirectoryStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = store.purge_expired().await;
                    if removed > 0 {
                        debug!("Purged {} expired entries", removed);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::MemoryGossipHub;
    use crate::protocol::{AddRequest, ListRequest};
    use crate::replication::ReplicationError;
    use dirnet_common::Status;
    use std::io::Write;

    fn config() -> DaemonConfig {
        DaemonConfig::new().with_bootstrap("127.0.0.1:4343")
    }

    #[tokio::test]
    async fn test_node_serves_requests() {
        let hub = MemoryGossipHub::new();
        let (member, inbox) = hub.join();
        let node = DirectoryNode::with_network(config(), Arc::new(member), inbox)
            .await
            .unwrap();

        let service = node.service();
        let status = service
            .add(AddRequest::new("pairing", "abc123", "short"))
            .await;
        assert_eq!(status.status, Status::Success);
        assert_eq!(
            service.list(ListRequest::new("pairing")).await.entries,
            vec!["abc123"]
        );
    }

    #[tokio::test]
    async fn test_missing_bootstrap_is_fatal() {
        let hub = MemoryGossipHub::new();
        let (member, inbox) = hub.join();
        let result =
            DirectoryNode::with_network(DaemonConfig::new(), Arc::new(member), inbox).await;
        assert!(result.is_err());

        assert!(DirectoryNode::new(DaemonConfig::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_policy_file_is_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[namespaces.\"secure\"]\nread_only = true\n")
            .unwrap();

        let hub = MemoryGossipHub::new();
        let (member, inbox) = hub.join();
        let result = DirectoryNode::with_network(
            config().with_policy_file(file.path().to_path_buf()),
            Arc::new(member),
            inbox,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stop_shuts_down_cleanly() {
        let hub = MemoryGossipHub::new();
        let (member, inbox) = hub.join();
        let node = DirectoryNode::with_network(config(), Arc::new(member), inbox)
            .await
            .unwrap();
        let mut shutdown = node.subscribe_shutdown();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(node.run(async move {
            let _ = stop_rx.await;
        }));

        stop_tx.send(()).unwrap();
        assert!(run.await.unwrap().is_ok());
        assert!(*shutdown.borrow_and_update());
    }

    #[tokio::test(start_paused = true)]
    async fn test_partition_ends_run_with_error() {
        let hub = MemoryGossipHub::new();
        let (member, inbox) = hub.join();
        let node = DirectoryNode::with_network(config(), Arc::new(member), inbox)
            .await
            .unwrap();

        let error = node.run(std::future::pending()).await.unwrap_err();
        let replication = error.downcast_ref::<ReplicationError>().unwrap();
        assert!(replication.is_partition());
    }
}
