/// Directory replication over the gossip room
///
/// Local writes are handed to a `ReplicationSink` after they reached the
/// store. The `Replicator` applies writes from peers and watches the room
/// for silence.

mod event;
mod liveness;
mod replicator;

pub use event::ReplicationEvent;
pub use liveness::LivenessState;
pub use replicator::{ReplicationError, Replicator, ReplicatorConfig};

use crate::p2p::{GossipError, GossipNetwork};
use std::sync::Arc;

/// Destination for locally originated replication events
#[async_trait::async_trait]
pub trait ReplicationSink: Send + Sync {
    async fn publish(&self, event: ReplicationEvent) -> Result<(), GossipError>;
}

/// Publishes events on the replicator's room
#[derive(Clone)]
pub struct ReplicationHandle {
    network: Arc<dyn GossipNetwork>,
}

impl ReplicationHandle {
    pub fn new(network: Arc<dyn GossipNetwork>) -> Self {
        Self { network }
    }
}

#[async_trait::async_trait]
impl ReplicationSink for ReplicationHandle {
    async fn publish(&self, event: ReplicationEvent) -> Result<(), GossipError> {
        let message = event.to_message()?;
        self.network.publish(message).await
    }
}
