/// Gossip frame encoding
///
/// A frame travels alone on a unidirectional QUIC stream as a 4-byte
/// little-endian length followed by the JSON encoded frame.

use super::TransportError;
use crate::protocol::GossipMessage;
use dirnet_common::config::p2p::MAX_FRAME_SIZE;
use dirnet_common::NodeId;
use quinn::{RecvStream, SendStream};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// Topic id of a room
pub fn topic_id(room: &str) -> String {
    blake3::hash(room.as_bytes()).to_hex().to_string()
}

/// Mesh level envelope around a [`GossipMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipFrame {
    /// Hashed room name
    pub topic: String,

    /// Node that first published the message
    pub origin: NodeId,

    /// Random id used for duplicate suppression
    pub id: u64,

    pub message: GossipMessage,
}

impl GossipFrame {
    pub fn new(topic: impl Into<String>, origin: NodeId, message: GossipMessage) -> Self {
        Self {
            topic: topic.into(),
            origin,
            id: rand::random(),
            message,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let body = serde_json::to_vec(self)?;
        let mut buf = Vec::with_capacity(4 + body.len());
        buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }
}

pub struct FrameCodec;

impl FrameCodec {
    /// Write an encoded frame and finish the stream
    pub async fn send(mut send: SendStream, encoded: &[u8]) -> Result<(), TransportError> {
        send.write_all(encoded)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        send.finish()
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        Ok(())
    }

    /// Read one frame from a stream
    pub async fn recv(recv: &mut RecvStream) -> Result<GossipFrame, TransportError> {
        let mut len_buf = [0u8; 4];
        recv.read_exact(&mut len_buf)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge(len));
        }

        let data = recv
            .read_to_end(len)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        if data.len() != len {
            return Err(TransportError::Stream(format!(
                "Incomplete frame: expected {} bytes, got {}",
                len,
                data.len()
            )));
        }

        let frame: GossipFrame = serde_json::from_slice(&data)
            .map_err(|e| TransportError::Stream(format!("Malformed frame: {}", e)))?;

        trace!("Received frame {:016x} ({} bytes)", frame.id, len);
        Ok(frame)
    }
}

/// Bounded set of recently seen frame ids
#[derive(Debug)]
pub struct SeenCache {
    ids: HashSet<u64>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl SeenCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record `id`, returning `false` if it was already present
    pub fn insert(&mut self, id: u64) -> bool {
        if !self.ids.insert(id) {
            return false;
        }

        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
