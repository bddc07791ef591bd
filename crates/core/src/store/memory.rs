/// In-memory directory store
///
/// Every stored value carries its own deadline. Reads skip expired values;
/// `purge_expired` physically drops them and empty keys.

use super::{DirectoryStore, StoreError, StoreStatus};
use dirnet_common::config::directory::{
    DEFAULT_TTL_SECS, LONG_TTL_SECS, MIN_TTL_SECS, MODE_LONG, MODE_SHORT, SHORT_TTL_SECS,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<StoredEntry>>>,
    started_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    /// Number of keys, including ones only holding expired values
    pub async fn key_count(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Number of stored values, including expired ones
    pub async fn value_count(&self) -> usize {
        self.entries.read().await.values().map(Vec::len).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DirectoryStore for MemoryStore {
    async fn status(&self) -> Result<StoreStatus, StoreError> {
        let entries = self.entries.read().await;

        let mut keyspace = BTreeMap::new();
        keyspace.insert("keys".to_string(), entries.len().to_string());
        keyspace.insert(
            "values".to_string(),
            entries.values().map(Vec::len).sum::<usize>().to_string(),
        );

        let mut server = BTreeMap::new();
        server.insert(
            "uptime_in_seconds".to_string(),
            self.started_at.elapsed().as_secs().to_string(),
        );

        Ok(StoreStatus {
            backend: "memory".to_string(),
            keyspace,
            server,
        })
    }

    fn time_to_live(&self, mode: &str) -> Duration {
        match mode {
            MODE_SHORT => Duration::from_secs(SHORT_TTL_SECS),
            MODE_LONG => Duration::from_secs(LONG_TTL_SECS),
            _ => Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;

        Ok(entries
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .filter(|v| !v.is_expired(now))
                    .map(|v| v.value.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        if ttl < Duration::from_secs(MIN_TTL_SECS) {
            return Err(StoreError::InvalidTtl(ttl));
        }

        let entry = StoredEntry {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        };

        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(entry);

        Ok(())
    }

    async fn remove(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;

        if let Some(values) = entries.get_mut(key) {
            values.retain(|v| v.value != value);
            if values.is_empty() {
                entries.remove(key);
            }
        }

        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut removed_count = 0;

        for values in entries.values_mut() {
            let before = values.len();
            values.retain(|v| !v.is_expired(now));
            removed_count += before - values.len();
        }

        entries.retain(|_, v| !v.is_empty());

        removed_count
    }
}
