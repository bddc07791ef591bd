use dirnet_common::{Status, Timestamp};
use dirnet_core::auth::entry_message;
use dirnet_core::{
    AddRequest, Credentials, DirectoryService, DirectoryStore, GossipNetwork, KeyPair,
    ListRequest, MemoryGossipHub, MemoryStore, PolicyRegistry, PolicyTable, RemoveRequest,
    ReplicationEvent, Replicator, ReplicatorConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct TestNode {
    service: DirectoryService,
    store: Arc<MemoryStore>,
    task: JoinHandle<Result<(), dirnet_core::ReplicationError>>,
}

fn spawn_node(
    hub: &MemoryGossipHub,
    policies: PolicyRegistry,
    shutdown: watch::Receiver<bool>,
) -> TestNode {
    let (member, inbox) = hub.join();
    let store = Arc::new(MemoryStore::new());
    let config = ReplicatorConfig::new(vec!["127.0.0.1:4343".to_string()], "dirnet");

    let replicator =
        Replicator::new(&config, Arc::new(member), inbox, Some(store.clone())).unwrap();
    let service = DirectoryService::new(policies)
        .with_store(store.clone())
        .with_replication(Arc::new(replicator.handle()));

    TestNode {
        service,
        store,
        task: tokio::spawn(replicator.run(shutdown)),
    }
}

fn secure_policies(owner: &KeyPair) -> PolicyRegistry {
    let table = PolicyTable::from_toml(&format!(
        r#"
[namespaces."secure"]
algorithm = "ed25519"
public_key = "{}"
read_only = true
"#,
        owner.public_key_hex()
    ))
    .unwrap();
    PolicyRegistry::new(table)
}

fn signed(keypair: &KeyPair, name: &str, entry: &str) -> Credentials {
    let ts = Timestamp::now().as_nanos();
    Credentials {
        public_key: keypair.public_key_hex(),
        algorithm: "ed25519".to_string(),
        signature: keypair.sign_hex(entry_message(name, ts, entry).as_bytes()),
        timestamp: ts,
    }
}

async fn wait_for_entries(store: &MemoryStore, name: &str, expected: &[&str]) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let mut entries = store.list(name).await.unwrap();
            entries.sort();
            if entries == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_unmanaged_write_is_replicated() {
    let hub = MemoryGossipHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let a = spawn_node(&hub, PolicyRegistry::empty(), shutdown_rx.clone());
    let b = spawn_node(&hub, PolicyRegistry::empty(), shutdown_rx);

    let status = a
        .service
        .add(AddRequest::new("pairing", "abc123", "short"))
        .await;
    assert_eq!(status.status, Status::Success);
    assert_eq!(
        a.service.list(ListRequest::new("pairing")).await.entries,
        vec!["abc123"]
    );

    wait_for_entries(&b.store, "pairing", &["abc123"]).await;
    assert_eq!(
        b.service.list(ListRequest::new("pairing")).await.entries,
        vec!["abc123"]
    );

    b.service
        .remove(RemoveRequest::new("pairing", "abc123"))
        .await;
    wait_for_entries(&a.store, "pairing", &[]).await;

    shutdown_tx.send(true).unwrap();
    assert!(a.task.await.unwrap().is_ok());
    assert!(b.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_rejected_write_is_not_replicated() {
    let owner = KeyPair::generate();
    let intruder = KeyPair::generate();
    let hub = MemoryGossipHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let a = spawn_node(&hub, secure_policies(&owner), shutdown_rx.clone());
    let b = spawn_node(&hub, secure_policies(&owner), shutdown_rx);

    let rejected = AddRequest::new("secure", "forged", "default")
        .with_credentials(signed(&intruder, "secure", "forged"));
    assert_eq!(a.service.add(rejected).await.status, Status::Error);

    let accepted = AddRequest::new("secure", "genuine", "default")
        .with_credentials(signed(&owner, "secure", "genuine"));
    assert_eq!(a.service.add(accepted).await.status, Status::Success);

    // Only the accepted write reaches the peer
    wait_for_entries(&b.store, "secure", &["genuine"]).await;
    assert_eq!(a.store.list("secure").await.unwrap(), vec!["genuine"]);

    shutdown_tx.send(true).unwrap();
    assert!(a.task.await.unwrap().is_ok());
    assert!(b.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_gossip_writes_bypass_policy() {
    let owner = KeyPair::generate();
    let hub = MemoryGossipHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let node = spawn_node(&hub, secure_policies(&owner), shutdown_rx);

    // A bare room member, not a directory node
    let (peer, _peer_inbox) = hub.join();
    for (name, entry) in [("pairing", "xyz"), ("secure", "unsigned")] {
        let event = ReplicationEvent::Add(dirnet_core::EntryPayload {
            name: name.to_string(),
            entry: entry.to_string(),
            mode: "short".to_string(),
        });
        peer.publish(event.to_message().unwrap()).await.unwrap();
    }

    wait_for_entries(&node.store, "pairing", &["xyz"]).await;
    assert_eq!(
        node.service.list(ListRequest::new("pairing")).await.entries,
        vec!["xyz"]
    );

    // Applied even though a local request would need the owner's signature
    wait_for_entries(&node.store, "secure", &["unsigned"]).await;

    shutdown_tx.send(true).unwrap();
    assert!(node.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_duplicates_are_kept_across_nodes() {
    let hub = MemoryGossipHub::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let a = spawn_node(&hub, PolicyRegistry::empty(), shutdown_rx.clone());
    let b = spawn_node(&hub, PolicyRegistry::empty(), shutdown_rx);

    a.service.add(AddRequest::new("pool", "same", "short")).await;
    b.service.add(AddRequest::new("pool", "same", "short")).await;

    wait_for_entries(&a.store, "pool", &["same", "same"]).await;
    wait_for_entries(&b.store, "pool", &["same", "same"]).await;

    shutdown_tx.send(true).unwrap();
    assert!(a.task.await.unwrap().is_ok());
    assert!(b.task.await.unwrap().is_ok());
}
