/// Gossip room membership
///
/// A node joins one named room and receives every message published there
/// by other members through an `mpsc` inbox. Delivery is best effort: no
/// ordering, no acknowledgement, and a member never receives its own
/// messages.

mod codec;
mod endpoint;
mod memory;
mod quic;

pub use codec::{topic_id, FrameCodec, GossipFrame, SeenCache};
pub use endpoint::{Endpoint, TransportError};
pub use memory::{MemoryGossip, MemoryGossipHub};
pub use quic::{QuicGossip, QuicGossipConfig};

use crate::protocol::GossipMessage;
use dirnet_common::NodeId;
use tokio::sync::mpsc;

/// Receiving half of a room membership
pub type GossipInbox = mpsc::Receiver<GossipMessage>;

/// Publishing half of a room membership
#[async_trait::async_trait]
pub trait GossipNetwork: Send + Sync {
    /// Identity this member publishes under
    fn local_id(&self) -> NodeId;

    /// Broadcast `message` to every other member of the room
    async fn publish(&self, message: GossipMessage) -> Result<(), GossipError>;

    /// Number of directly reachable members
    async fn peer_count(&self) -> usize;

    /// Leave the room; later publishes fail with [`GossipError::Closed`]
    async fn leave(&self);
}

/// Gossip errors
#[derive(Debug, thiserror::Error)]
pub enum GossipError {
    #[error("Gossip session closed")]
    Closed,

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
