/// Gossip session owner
///
/// A single task multiplexes inbound room traffic, the liveness tick and
/// the shutdown signal. Peer writes are applied to the local store as
/// received; the room's silence is measured against the liveness window and
/// a partition ends the loop with [`ReplicationError::PartitionTimeout`].

use super::{LivenessState, ReplicationEvent, ReplicationHandle};
use crate::p2p::{GossipInbox, GossipNetwork};
use crate::protocol::{EntryPayload, GossipMessage};
use crate::store::DirectoryStore;
use dirnet_common::config::p2p::TICK_INTERVAL_SECS;
use dirnet_common::P2pSection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Room parameters the replicator refuses to start without
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    pub bootstrap: Vec<String>,
    pub room: String,
    pub tick_interval: Duration,
}

impl ReplicatorConfig {
    pub fn new(bootstrap: Vec<String>, room: impl Into<String>) -> Self {
        Self {
            bootstrap,
            room: room.into(),
            tick_interval: Duration::from_secs(TICK_INTERVAL_SECS),
        }
    }

    pub fn validate(&self) -> Result<(), ReplicationError> {
        if self.bootstrap.is_empty() {
            return Err(ReplicationError::MissingBootstrap);
        }
        if self.room.trim().is_empty() {
            return Err(ReplicationError::MissingRoom);
        }
        Ok(())
    }
}

impl From<&P2pSection> for ReplicatorConfig {
    fn from(section: &P2pSection) -> Self {
        Self::new(section.bootstrap_peers(), section.room.clone())
    }
}

pub struct Replicator {
    network: Arc<dyn GossipNetwork>,
    inbox: GossipInbox,
    store: Option<Arc<dyn DirectoryStore>>,
    tick_interval: Duration,
}

impl Replicator {
    /// Wrap a joined room
    ///
    /// Fails if the configuration lacks a bootstrap list or a room.
    pub fn new(
        config: &ReplicatorConfig,
        network: Arc<dyn GossipNetwork>,
        inbox: GossipInbox,
        store: Option<Arc<dyn DirectoryStore>>,
    ) -> Result<Self, ReplicationError> {
        config.validate()?;

        Ok(Self {
            network,
            inbox,
            store,
            tick_interval: config.tick_interval,
        })
    }

    /// Publishing handle for request handlers
    pub fn handle(&self) -> ReplicationHandle {
        ReplicationHandle::new(self.network.clone())
    }

    /// Run until shutdown or partition
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ReplicationError> {
        let start = Instant::now();
        let mut liveness = LivenessState::new(start);
        let mut ticker = tokio::time::interval_at(start + self.tick_interval, self.tick_interval);
        let mut inbox_open = true;

        info!(
            "Replicator started as {}, liveness window {:?}",
            self.network.local_id().short(),
            liveness.window()
        );

        let result = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Replicator shutting down");
                        break Ok(());
                    }
                }
                received = self.inbox.recv(), if inbox_open => match received {
                    Some(message) => self.handle_message(message, &mut liveness).await,
                    None => {
                        warn!("Gossip inbox closed, no more peer traffic");
                        inbox_open = false;
                    }
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    if liveness.is_partitioned(now) {
                        let silence = liveness.silence(now);
                        error!(
                            "No peer traffic for {:?} (window {:?}), assuming partition",
                            silence,
                            liveness.window()
                        );
                        break Err(ReplicationError::PartitionTimeout(silence));
                    }

                    self.publish_heartbeat().await;
                }
            }
        };

        self.network.leave().await;
        result
    }

    async fn handle_message(&self, message: GossipMessage, liveness: &mut LivenessState) {
        let event = match ReplicationEvent::from_message(&message) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("Ignoring gossip message with context {}", message.context);
                return;
            }
            Err(e) => {
                warn!("Malformed {} payload: {}", message.context, e);
                return;
            }
        };

        let now = Instant::now();
        match event {
            ReplicationEvent::Heartbeat => {
                debug!("Heartbeat received");
                liveness.observe_heartbeat(now);
            }
            ReplicationEvent::Add(payload) => {
                liveness.observe_message(now);
                self.apply_add(payload).await;
            }
            ReplicationEvent::Remove(payload) => {
                liveness.observe_message(now);
                self.apply_remove(payload).await;
            }
        }
    }

    // Peer writes are applied without signature checks.
    async fn apply_add(&self, payload: EntryPayload) {
        let Some(store) = &self.store else {
            error!("No store configured, dropping replicated add to {}", payload.name);
            return;
        };

        let ttl = store.time_to_live(&payload.mode);
        match store.add(&payload.name, &payload.entry, ttl).await {
            Ok(()) => debug!("Replicated add to {}", payload.name),
            Err(e) => error!("Failed to apply replicated add to {}: {}", payload.name, e),
        }
    }

    async fn apply_remove(&self, payload: EntryPayload) {
        let Some(store) = &self.store else {
            error!("No store configured, dropping replicated remove from {}", payload.name);
            return;
        };

        match store.remove(&payload.name, &payload.entry).await {
            Ok(()) => debug!("Replicated remove from {}", payload.name),
            Err(e) => error!("Failed to apply replicated remove from {}: {}", payload.name, e),
        }
    }

    async fn publish_heartbeat(&self) {
        let message = match ReplicationEvent::Heartbeat.to_message() {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to encode heartbeat: {}", e);
                return;
            }
        };

        match self.network.publish(message).await {
            Ok(()) => debug!("Heartbeat published"),
            Err(e) => warn!("Failed to publish heartbeat: {}", e),
        }
    }
}

/// Replication errors
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("No bootstrap peers configured")]
    MissingBootstrap,

    #[error("No gossip room configured")]
    MissingRoom,

    #[error("Partitioned from the network after {0:?} of silence")]
    PartitionTimeout(Duration),
}

impl ReplicationError {
    pub fn is_partition(&self) -> bool {
        matches!(self, Self::PartitionTimeout(_))
    }
}
