pub mod auth;
pub mod identity;
pub mod node;
pub mod p2p;
pub mod policy;
pub mod protocol;
pub mod replication;
pub mod service;
pub mod store;

pub use identity::{KeyPair, KeyPairError, PublicKey};
pub use node::DirectoryNode;
pub use protocol::*;

// Re-export access control types
pub use auth::{AuthError, Credentials, SignatureVerifier};
pub use policy::{Policy, PolicyEntry, PolicyError, PolicyRegistry, PolicyTable, PolicyWatcher};

// Re-export gossip and replication types
pub use p2p::{GossipError, GossipNetwork, MemoryGossip, MemoryGossipHub, QuicGossip};
pub use replication::{
    ReplicationError, ReplicationEvent, ReplicationHandle, ReplicationSink, Replicator,
    ReplicatorConfig,
};

// Re-export directory types
pub use service::{dispatch, DirectoryApi, DirectoryService, RpcError};
pub use store::{open_store, DirectoryStore, MemoryStore, StoreError, StoreStatus};
