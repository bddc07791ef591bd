/// Directory storage backends
///
/// The directory only depends on the `DirectoryStore` contract: a
/// multi-value map from namespace to string entries where each entry expires
/// after its own TTL. Expiry enforcement belongs to the backend.

mod memory;

pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Backend diagnostics, grouped by section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatus {
    /// Backend name
    pub backend: String,

    /// Key and value counts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keyspace: BTreeMap<String, String>,

    /// Process level information
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub server: BTreeMap<String, String>,
}

/// Multi-value, TTL-scoped key/value store
///
/// Implementations must be `Send + Sync`; request handlers and the
/// replication loop call into the same store concurrently.
#[async_trait::async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Internal diagnostics, not used on the request path
    async fn status(&self) -> Result<StoreStatus, StoreError>;

    /// Duration for a symbolic mode such as `"short"` or `"default"`
    fn time_to_live(&self, mode: &str) -> Duration;

    /// All live values stored under `key`
    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Store `value` under `key`
    ///
    /// `ttl` must be at least one second. The same value may be stored
    /// several times under one key.
    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Remove `value` from `key`
    async fn remove(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Drop expired values, returning how many were removed
    ///
    /// Backends that expire entries on their own keep the default.
    async fn purge_expired(&self) -> usize {
        0
    }
}

/// Open the backend named in the configuration
pub fn open_store(backend: &str) -> Result<Arc<dyn DirectoryStore>, StoreError> {
    match backend {
        "" | "default" | "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::UnsupportedBackend(other.to_string())),
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("TTL must be at least one second, got {0:?}")]
    InvalidTtl(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported store backend: {0}")]
    UnsupportedBackend(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_store() {
        let store = open_store("default").unwrap();
        assert_eq!(store.status().await.unwrap().backend, "memory");

        assert!(open_store("memory").is_ok());
        assert!(matches!(
            open_store("redis"),
            Err(StoreError::UnsupportedBackend(_))
        ));
    }
}
