/// Directory request handlers
///
/// Every operation resolves the namespace policy first. Confidential
/// namespaces require a valid signature to be listed, read-only namespaces
/// to be written. Failures never tell the caller why: a List comes back
/// empty and a write reports `error`.

use crate::auth::{Credentials, SignatureVerifier};
use crate::policy::{Policy, PolicyRegistry};
use crate::protocol::{
    AddRequest, EntryPayload, ListRequest, ListResponse, RemoveRequest, StatusResponse,
};
use crate::replication::{ReplicationEvent, ReplicationSink};
use crate::store::DirectoryStore;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

pub struct DirectoryService {
    store: Option<Arc<dyn DirectoryStore>>,
    replication: Option<Arc<dyn ReplicationSink>>,
    policies: PolicyRegistry,
    verifier: SignatureVerifier,

    /// Source for List sampling
    rng: Mutex<StdRng>,
}

impl DirectoryService {
    pub fn new(policies: PolicyRegistry) -> Self {
        Self {
            store: None,
            replication: None,
            policies,
            verifier: SignatureVerifier::new(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DirectoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_replication(mut self, replication: Arc<dyn ReplicationSink>) -> Self {
        self.replication = Some(replication);
        self
    }

    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn DirectoryStore>> {
        self.store.as_ref()
    }

    /// Entries of a namespace, optionally sampled down to `limit`
    pub async fn list(&self, request: ListRequest) -> ListResponse {
        let Some(store) = &self.store else {
            error!("Directory store not configured");
            return ListResponse::empty(request.name);
        };

        let policy = self
            .policies
            .lookup(&request.name, &request.credentials.public_key);
        if policy.confidential
            && !self.authorized(&policy, &request.credentials, &request.canonical_message())
        {
            return ListResponse::empty(request.name);
        }

        let mut entries = match store.list(&request.name).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list {}: {}", request.name, e);
                return ListResponse::empty(request.name);
            }
        };

        if let Ok(limit) = usize::try_from(request.limit) {
            if limit > 0 && limit < entries.len() {
                entries.shuffle(&mut *self.rng.lock().await);
                entries.truncate(limit);
            }
        }

        trace!("List: {} ({})", request.name, entries.len());

        ListResponse {
            name: request.name,
            entries,
        }
    }

    /// Store an entry and replicate it
    pub async fn add(&self, request: AddRequest) -> StatusResponse {
        let Some((store, replication)) = self.dependencies() else {
            return StatusResponse::error();
        };

        let policy = self
            .policies
            .lookup(&request.name, &request.credentials.public_key);
        if policy.read_only
            && !self.authorized(&policy, &request.credentials, &request.canonical_message())
        {
            return StatusResponse::error();
        }

        debug!("Add: {} {}", request.name, request.entry);

        let ttl = store.time_to_live(&request.mode);
        if let Err(e) = store.add(&request.name, &request.entry, ttl).await {
            error!("Failed to add entry to {}: {}", request.name, e);
            return StatusResponse::error();
        }

        let event = ReplicationEvent::Add(EntryPayload::from(&request));
        if let Err(e) = replication.publish(event).await {
            warn!("Failed to replicate add to {}: {}", request.name, e);
        }

        StatusResponse::success()
    }

    /// Remove an entry and replicate the removal
    ///
    /// The removal is replicated even if the local store failed.
    pub async fn remove(&self, request: RemoveRequest) -> StatusResponse {
        let Some((store, replication)) = self.dependencies() else {
            return StatusResponse::error();
        };

        let policy = self
            .policies
            .lookup(&request.name, &request.credentials.public_key);
        if policy.read_only
            && !self.authorized(&policy, &request.credentials, &request.canonical_message())
        {
            return StatusResponse::error();
        }

        debug!("Remove: {} {}", request.name, request.entry);

        let status = match store.remove(&request.name, &request.entry).await {
            Ok(()) => StatusResponse::success(),
            Err(e) => {
                error!("Failed to remove entry from {}: {}", request.name, e);
                StatusResponse::error()
            }
        };

        let event = ReplicationEvent::Remove(EntryPayload::from(&request));
        if let Err(e) = replication.publish(event).await {
            warn!("Failed to replicate remove from {}: {}", request.name, e);
        }

        status
    }

    fn dependencies(&self) -> Option<(&Arc<dyn DirectoryStore>, &Arc<dyn ReplicationSink>)> {
        let Some(store) = &self.store else {
            error!("Directory store not configured");
            return None;
        };
        let Some(replication) = &self.replication else {
            error!("Replication not configured");
            return None;
        };
        Some((store, replication))
    }

    fn authorized(&self, policy: &Policy, credentials: &Credentials, message: &str) -> bool {
        match self.verifier.verify(policy, credentials, message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Signature rejected for {}: {}", policy.prefix, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{entry_message, list_message};
    use crate::identity::KeyPair;
    use crate::p2p::GossipError;
    use crate::policy::{PolicyEntry, PolicyTable};
    use crate::store::MemoryStore;
    use dirnet_common::{Status, Timestamp};
    use std::collections::HashSet;
    use std::time::Duration;

    /// Records published events
    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ReplicationEvent>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ReplicationSink for RecordingSink {
        async fn publish(&self, event: ReplicationEvent) -> Result<(), GossipError> {
            self.events.lock().await.push(event);
            if self.fail {
                Err(GossipError::Closed)
            } else {
                Ok(())
            }
        }
    }

    struct Fixture {
        service: DirectoryService,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        owner: KeyPair,
    }

    fn fixture() -> Fixture {
        fixture_with_sink(RecordingSink::default())
    }

    fn fixture_with_sink(sink: RecordingSink) -> Fixture {
        let owner = KeyPair::generate();
        let entry = |confidential, read_only| PolicyEntry {
            algorithm: "ed25519".to_string(),
            public_key: owner.public_key_hex(),
            additional_keys: Vec::new(),
            confidential,
            read_only,
        };
        let table = PolicyTable::from_entries(vec![
            ("secure".to_string(), entry(false, true)),
            ("private".to_string(), entry(true, false)),
        ])
        .unwrap();

        let registry = PolicyRegistry::empty();
        registry.replace(table);

        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(sink);
        let service = DirectoryService::new(registry)
            .with_store(store.clone())
            .with_replication(sink.clone())
            .with_rng(StdRng::seed_from_u64(7));

        Fixture {
            service,
            store,
            sink,
            owner,
        }
    }

    fn sign_entry(keypair: &KeyPair, name: &str, entry: &str) -> Credentials {
        let ts = Timestamp::now().as_nanos();
        Credentials {
            public_key: keypair.public_key_hex(),
            algorithm: "ed25519".to_string(),
            signature: keypair.sign_hex(entry_message(name, ts, entry).as_bytes()),
            timestamp: ts,
        }
    }

    fn sign_list(keypair: &KeyPair, name: &str) -> Credentials {
        let ts = Timestamp::now().as_nanos();
        Credentials {
            public_key: keypair.public_key_hex(),
            algorithm: "ed25519".to_string(),
            signature: keypair.sign_hex(list_message(name, ts).as_bytes()),
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_unmanaged_add_then_list() {
        let f = fixture();

        let status = f
            .service
            .add(AddRequest::new("pairing", "abc123", "short"))
            .await;
        assert_eq!(status.status, Status::Success);

        let listed = f.service.list(ListRequest::new("pairing")).await;
        assert_eq!(listed.name, "pairing");
        assert_eq!(listed.entries, vec!["abc123"]);

        let events = f.sink.events.lock().await;
        assert_eq!(
            *events,
            vec![ReplicationEvent::Add(EntryPayload {
                name: "pairing".to_string(),
                entry: "abc123".to_string(),
                mode: "short".to_string(),
            })]
        );
    }

    #[tokio::test]
    async fn test_read_only_rejects_foreign_key() {
        let f = fixture();
        let intruder = KeyPair::generate();

        let request = AddRequest::new("secure", "v1", "default")
            .with_credentials(sign_entry(&intruder, "secure", "v1"));
        assert_eq!(f.service.add(request).await.status, Status::Error);

        assert!(f.store.list("secure").await.unwrap().is_empty());
        assert!(f.sink.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_read_only_rejects_unsigned() {
        let f = fixture();

        let status = f
            .service
            .add(AddRequest::new("secure/sub", "v1", "default"))
            .await;
        assert_eq!(status.status, Status::Error);
        assert_eq!(f.store.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_read_only_accepts_owner_and_stays_publicly_readable() {
        let f = fixture();

        let request = AddRequest::new("secure", "v1", "default")
            .with_credentials(sign_entry(&f.owner, "secure", "v1"));
        assert_eq!(f.service.add(request).await.status, Status::Success);

        // Not confidential: anyone can read
        let listed = f.service.list(ListRequest::new("secure")).await;
        assert_eq!(listed.entries, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_expired_signature_is_rejected() {
        let f = fixture();
        let ts = Timestamp::now()
            .saturating_sub(Duration::from_secs(25 * 60 * 60))
            .as_nanos();
        let credentials = Credentials {
            public_key: f.owner.public_key_hex(),
            algorithm: "ed25519".to_string(),
            signature: f
                .owner
                .sign_hex(entry_message("secure", ts, "v1").as_bytes()),
            timestamp: ts,
        };

        let request = AddRequest::new("secure", "v1", "default").with_credentials(credentials);
        assert_eq!(f.service.add(request).await.status, Status::Error);
    }

    #[tokio::test]
    async fn test_confidential_list_requires_signature() {
        let f = fixture();
        f.store
            .add("private", "secret", Duration::from_secs(60))
            .await
            .unwrap();

        // Writes are open on a confidential but writable namespace
        let status = f
            .service
            .add(AddRequest::new("private", "other", "short"))
            .await;
        assert_eq!(status.status, Status::Success);

        let anonymous = f.service.list(ListRequest::new("private")).await;
        assert_eq!(anonymous.name, "private");
        assert!(anonymous.entries.is_empty());

        let signed = ListRequest::new("private").with_credentials(sign_list(&f.owner, "private"));
        let mut entries = f.service.list(signed).await.entries;
        entries.sort();
        assert_eq!(entries, vec!["other", "secret"]);
    }

    #[tokio::test]
    async fn test_list_sampling() {
        let f = fixture();
        let all: HashSet<String> = (0..10).map(|i| format!("peer-{i}")).collect();
        for entry in &all {
            f.store.add("pool", entry, Duration::from_secs(60)).await.unwrap();
        }

        let mut samples = HashSet::new();
        for _ in 0..10 {
            let listed = f.service.list(ListRequest::new("pool").with_limit(3)).await;
            assert_eq!(listed.entries.len(), 3);
            assert!(listed.entries.iter().all(|e| all.contains(e)));
            samples.insert(listed.entries);
        }
        assert!(samples.len() > 1, "sampling should vary between calls");

        // Limits that do not restrict return everything
        for limit in [0, -1, 10, 11] {
            let listed = f.service.list(ListRequest::new("pool").with_limit(limit)).await;
            assert_eq!(listed.entries.len(), 10);
        }
    }

    #[tokio::test]
    async fn test_remove_replicates_even_when_absent() {
        let f = fixture();
        f.service
            .add(AddRequest::new("pairing", "abc", "short"))
            .await;

        let status = f.service.remove(RemoveRequest::new("pairing", "abc")).await;
        assert_eq!(status.status, Status::Success);
        assert!(f.store.list("pairing").await.unwrap().is_empty());

        let status = f.service.remove(RemoveRequest::new("pairing", "abc")).await;
        assert_eq!(status.status, Status::Success);

        let events = f.sink.events.lock().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[2], ReplicationEvent::Remove(_)));
    }

    #[tokio::test]
    async fn test_read_only_remove_requires_owner() {
        let f = fixture();
        f.store.add("secure", "v1", Duration::from_secs(60)).await.unwrap();

        let status = f.service.remove(RemoveRequest::new("secure", "v1")).await;
        assert_eq!(status.status, Status::Error);
        assert_eq!(f.store.list("secure").await.unwrap(), vec!["v1"]);

        let request = RemoveRequest::new("secure", "v1")
            .with_credentials(sign_entry(&f.owner, "secure", "v1"));
        assert_eq!(f.service.remove(request).await.status, Status::Success);
        assert!(f.store.list("secure").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_add() {
        let f = fixture_with_sink(RecordingSink {
            fail: true,
            ..Default::default()
        });

        let status = f
            .service
            .add(AddRequest::new("pairing", "abc", "short"))
            .await;
        assert_eq!(status.status, Status::Success);
        assert_eq!(f.store.list("pairing").await.unwrap(), vec!["abc"]);
    }

    #[tokio::test]
    async fn test_invalid_ttl_reports_error_without_replication() {
        struct ZeroTtl(MemoryStore);

        #[async_trait::async_trait]
        impl DirectoryStore for ZeroTtl {
            async fn status(&self) -> Result<crate::store::StoreStatus, crate::store::StoreError> {
                self.0.status().await
            }
            fn time_to_live(&self, _mode: &str) -> Duration {
                Duration::ZERO
            }
            async fn list(&self, key: &str) -> Result<Vec<String>, crate::store::StoreError> {
                self.0.list(key).await
            }
            async fn add(
                &self,
                key: &str,
                value: &str,
                ttl: Duration,
            ) -> Result<(), crate::store::StoreError> {
                self.0.add(key, value, ttl).await
            }
            async fn remove(&self, key: &str, value: &str) -> Result<(), crate::store::StoreError> {
                self.0.remove(key, value).await
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let service = DirectoryService::new(PolicyRegistry::empty())
            .with_store(Arc::new(ZeroTtl(MemoryStore::new())))
            .with_replication(sink.clone());

        let status = service.add(AddRequest::new("pairing", "abc", "short")).await;
        assert_eq!(status.status, Status::Error);
        assert!(sink.events.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependencies_fail_neutrally() {
        let service = DirectoryService::new(PolicyRegistry::empty());
        assert!(service.list(ListRequest::new("pairing")).await.entries.is_empty());
        assert_eq!(
            service
                .add(AddRequest::new("pairing", "abc", "short"))
                .await
                .status,
            Status::Error
        );

        let store = Arc::new(MemoryStore::new());
        let without_replication =
            DirectoryService::new(PolicyRegistry::empty()).with_store(store.clone());
        assert_eq!(
            without_replication
                .remove(RemoveRequest::new("pairing", "abc"))
                .await
                .status,
            Status::Error
        );
        assert_eq!(
            without_replication
                .add(AddRequest::new("pairing", "abc", "short"))
                .await
                .status,
            Status::Error
        );
        assert_eq!(store.key_count().await, 0);
    }
}
