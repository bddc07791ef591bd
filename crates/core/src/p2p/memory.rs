/// In-process gossip room
///
/// Members of a [`MemoryGossipHub`] share one tokio broadcast channel.
/// Used by tests and single process clusters.

use super::{GossipError, GossipInbox, GossipNetwork};
use crate::protocol::GossipMessage;
use dirnet_common::config::p2p::INBOX_CAPACITY;
use dirnet_common::NodeId;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Envelope {
    origin: NodeId,
    message: GossipMessage,
}

/// Shared room that members join
#[derive(Debug, Clone)]
pub struct MemoryGossipHub {
    sender: broadcast::Sender<Envelope>,
}

impl MemoryGossipHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(INBOX_CAPACITY);
        Self { sender }
    }

    /// Join the room under a random identity
    ///
    /// Must be called from within a tokio runtime.
    pub fn join(&self) -> (MemoryGossip, GossipInbox) {
        self.join_as(NodeId::from_bytes(rand::random()))
    }

    /// Join the room under `id`
    pub fn join_as(&self, id: NodeId) -> (MemoryGossip, GossipInbox) {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        let (leave_tx, leave_rx) = watch::channel(false);

        tokio::spawn(forward(id, self.sender.subscribe(), inbox_tx, leave_rx));

        let member = MemoryGossip {
            id,
            sender: self.sender.clone(),
            leave: leave_tx,
        };
        (member, inbox_rx)
    }

    /// Number of current members
    pub fn member_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryGossipHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy room traffic not originating from `id` into its inbox
async fn forward(
    id: NodeId,
    mut room: broadcast::Receiver<Envelope>,
    inbox: mpsc::Sender<GossipMessage>,
    mut leave: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = room.recv() => match received {
                Ok(envelope) if envelope.origin == id => {}
                Ok(envelope) => {
                    if inbox.send(envelope.message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Member {} lagged, {} messages dropped", id.short(), skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = leave.changed() => break,
        }
    }

    debug!("Member {} left the room", id.short());
}

/// Member of a [`MemoryGossipHub`]
#[derive(Debug)]
pub struct MemoryGossip {
    id: NodeId,
    sender: broadcast::Sender<Envelope>,
    leave: watch::Sender<bool>,
}

#[async_trait::async_trait]
impl GossipNetwork for MemoryGossip {
    fn local_id(&self) -> NodeId {
        self.id
    }

    async fn publish(&self, message: GossipMessage) -> Result<(), GossipError> {
        if *self.leave.borrow() {
            return Err(GossipError::Closed);
        }

        self.sender
            .send(Envelope {
                origin: self.id,
                message,
            })
            .map(|_| ())
            .map_err(|_| GossipError::Closed)
    }

    async fn peer_count(&self) -> usize {
        let own = usize::from(!*self.leave.borrow());
        self.sender.receiver_count().saturating_sub(own)
    }

    async fn leave(&self) {
        self.leave.send_replace(true);
    }
}
