use crate::protocol::{EntryPayload, GossipMessage};
use dirnet_common::config::directory::MODE_SHORT;
use dirnet_common::config::p2p::HEARTBEAT;
use dirnet_common::config::rpc::{DIRECTORY_ADD, DIRECTORY_REMOVE};
use dirnet_common::Timestamp;

/// A directory write or liveness signal exchanged between peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationEvent {
    Add(EntryPayload),
    Remove(EntryPayload),
    Heartbeat,
}

impl ReplicationEvent {
    pub fn context(&self) -> &'static str {
        match self {
            Self::Add(_) => DIRECTORY_ADD,
            Self::Remove(_) => DIRECTORY_REMOVE,
            Self::Heartbeat => HEARTBEAT,
        }
    }

    /// Wire form of the event
    ///
    /// Heartbeats also carry the sentinel name in their payload so peers
    /// that only look at the payload recognise them.
    pub fn to_message(&self) -> Result<GossipMessage, serde_json::Error> {
        match self {
            Self::Add(payload) | Self::Remove(payload) => {
                GossipMessage::new(self.context(), payload)
            }
            Self::Heartbeat => GossipMessage::new(
                HEARTBEAT,
                &EntryPayload {
                    name: HEARTBEAT.to_string(),
                    entry: Timestamp::now().as_secs().to_string(),
                    mode: MODE_SHORT.to_string(),
                },
            ),
        }
    }

    /// Decode a received message
    ///
    /// Returns `Ok(None)` for contexts this node does not handle.
    pub fn from_message(message: &GossipMessage) -> Result<Option<Self>, serde_json::Error> {
        if message.is_heartbeat() {
            return Ok(Some(Self::Heartbeat));
        }

        match message.context.as_str() {
            DIRECTORY_ADD => Ok(Some(Self::Add(message.parse_payload()?))),
            DIRECTORY_REMOVE => Ok(Some(Self::Remove(message.parse_payload()?))),
            _ => Ok(None),
        }
    }
}
