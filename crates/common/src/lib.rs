use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub mod config;
pub mod types;

pub use config::{
    ConfigError, DaemonConfig, DirectorySection, LogSection, P2pSection, PolicySection,
    ServerSection,
};
pub use types::{Status, Timestamp};

pub const NODE_ID_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid node id length: expected {expected}, got {actual}")]
    InvalidNodeId { expected: usize, actual: usize },
    #[error("invalid node id hex: {0}")]
    InvalidNodeIdHex(String),
}

/// Identifier of a gossip participant
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    pub fn from_bytes(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DomainError> {
        if bytes.len() != NODE_ID_LEN {
            return Err(DomainError::InvalidNodeId {
                expected: NODE_ID_LEN,
                actual: bytes.len(),
            });
        }

        let mut array = [0u8; NODE_ID_LEN];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, DomainError> {
        let decoded =
            hex::decode(hex_str).map_err(|err| DomainError::InvalidNodeIdHex(err.to_string()))?;
        Self::from_slice(&decoded)
    }

    /// Short form used in log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(value: [u8; NODE_ID_LEN]) -> Self {
        Self::from_bytes(value)
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for NodeId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl TryFrom<&[u8]> for NodeId {
    type Error = DomainError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(value)
    }
}

impl FromStr for NodeId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
