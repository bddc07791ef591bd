/// QUIC gossip mesh
///
/// Every node keeps one connection per neighbour, dialed from the
/// bootstrap list or accepted from peers that dialed in. Frames are flooded:
/// a frame seen for the first time is delivered locally and forwarded to
/// every neighbour except the one it came from.

use super::codec::{topic_id, FrameCodec, GossipFrame, SeenCache};
use super::endpoint::{Endpoint, TransportError};
use super::{GossipError, GossipInbox, GossipNetwork};
use crate::protocol::GossipMessage;
use dirnet_common::config::p2p::{INBOX_CAPACITY, SEEN_CACHE_SIZE};
use dirnet_common::NodeId;
use quinn::Connection;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, trace, warn};

/// Parameters for joining a mesh room
#[derive(Debug, Clone)]
pub struct QuicGossipConfig {
    pub bind_addr: SocketAddr,

    /// `host:port` addresses dialed at startup
    pub bootstrap: Vec<String>,

    pub room: String,

    pub local_id: NodeId,
}

struct Mesh {
    local_id: NodeId,
    topic: String,
    endpoint: Endpoint,
    peers: RwLock<HashMap<usize, Connection>>,
    seen: Mutex<SeenCache>,
    inbox: mpsc::Sender<GossipMessage>,
    closed: AtomicBool,
}

impl Mesh {
    async fn attach(self: &Arc<Self>, connection: Connection) {
        let peer_id = connection.stable_id();
        debug!("Peer {} attached", connection.remote_address());

        self.peers.write().await.insert(peer_id, connection.clone());
        tokio::spawn(read_loop(self.clone(), connection));
    }

    async fn handle_frame(&self, frame: GossipFrame, from: usize) {
        if frame.topic != self.topic {
            trace!("Dropping frame for foreign topic {}", frame.topic);
            return;
        }

        if frame.origin == self.local_id {
            return;
        }

        if !self.seen.lock().await.insert(frame.id) {
            trace!("Dropping duplicate frame {:016x}", frame.id);
            return;
        }

        match frame.encode() {
            Ok(encoded) => {
                self.broadcast(&encoded, Some(from)).await;
            }
            Err(e) => warn!("Failed to re-encode frame for forwarding: {}", e),
        }

        if self.inbox.send(frame.message).await.is_err() {
            debug!("Inbox closed, dropping frame {:016x}", frame.id);
        }
    }

    /// Send `encoded` to every neighbour except `except`
    ///
    /// Returns `(delivered, attempted)`.
    async fn broadcast(&self, encoded: &[u8], except: Option<usize>) -> (usize, usize) {
        let targets: Vec<Connection> = self
            .peers
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, conn)| conn.clone())
            .collect();

        let attempted = targets.len();
        let mut delivered = 0;

        for connection in targets {
            match send_frame(&connection, encoded).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to send frame to {}: {}", connection.remote_address(), e),
            }
        }

        (delivered, attempted)
    }
}

async fn send_frame(connection: &Connection, encoded: &[u8]) -> Result<(), TransportError> {
    let send = connection
        .open_uni()
        .await
        .map_err(|e| TransportError::Stream(e.to_string()))?;
    FrameCodec::send(send, encoded).await
}

async fn accept_loop(mesh: Arc<Mesh>) {
    loop {
        match mesh.endpoint.accept().await {
            Ok(connection) => {
                info!("Accepted gossip peer {}", connection.remote_address());
                mesh.attach(connection).await;
            }
            Err(TransportError::Closed) => break,
            Err(e) => warn!("Failed to accept gossip peer: {}", e),
        }
    }

    debug!("Gossip accept loop stopped");
}

async fn read_loop(mesh: Arc<Mesh>, connection: Connection) {
    let peer_id = connection.stable_id();

    loop {
        match connection.accept_uni().await {
            Ok(mut recv) => {
                let mesh = mesh.clone();
                tokio::spawn(async move {
                    match FrameCodec::recv(&mut recv).await {
                        Ok(frame) => mesh.handle_frame(frame, peer_id).await,
                        Err(e) => debug!("Discarding unreadable frame: {}", e),
                    }
                });
            }
            Err(e) => {
                debug!("Peer {} disconnected: {}", connection.remote_address(), e);
                break;
            }
        }
    }

    mesh.peers.write().await.remove(&peer_id);
}

/// Member of a QUIC gossip room
pub struct QuicGossip {
    mesh: Arc<Mesh>,
}

impl QuicGossip {
    /// Bind the endpoint, dial the bootstrap peers and start accepting
    ///
    /// Unreachable bootstrap peers are logged and skipped.
    pub async fn join(config: QuicGossipConfig) -> Result<(Self, GossipInbox), GossipError> {
        let endpoint = Endpoint::bind(config.bind_addr)?;
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

        let mesh = Arc::new(Mesh {
            local_id: config.local_id,
            topic: topic_id(&config.room),
            endpoint,
            peers: RwLock::new(HashMap::new()),
            seen: Mutex::new(SeenCache::new(SEEN_CACHE_SIZE)),
            inbox: inbox_tx,
            closed: AtomicBool::new(false),
        });

        tokio::spawn(accept_loop(mesh.clone()));

        let gossip = Self { mesh };
        for peer in &config.bootstrap {
            if let Err(e) = gossip.dial(peer).await {
                warn!("Skipping bootstrap peer {}: {}", peer, e);
            }
        }

        let peers = gossip.peer_count().await;
        info!(
            "Joined room {} as {} on {} with {} peers",
            config.room,
            config.local_id.short(),
            gossip.local_addr(),
            peers
        );

        Ok((gossip, inbox_rx))
    }

    /// Dial a `host:port` address and add it as a neighbour
    pub async fn dial(&self, peer: &str) -> Result<(), GossipError> {
        let addr = tokio::net::lookup_host(peer)
            .await
            .map_err(|e| GossipError::Bootstrap(format!("{}: {}", peer, e)))?
            .next()
            .ok_or_else(|| GossipError::Bootstrap(format!("{}: no address", peer)))?;

        let connection = self.mesh.endpoint.connect(addr).await?;
        self.mesh.attach(connection).await;
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.mesh.endpoint.local_addr()
    }
}

#[async_trait::async_trait]
impl GossipNetwork for QuicGossip {
    fn local_id(&self) -> NodeId {
        self.mesh.local_id
    }

    async fn publish(&self, message: GossipMessage) -> Result<(), GossipError> {
        if self.mesh.closed.load(Ordering::Acquire) {
            return Err(GossipError::Closed);
        }

        let frame = GossipFrame::new(self.mesh.topic.clone(), self.mesh.local_id, message);
        self.mesh.seen.lock().await.insert(frame.id);
        let encoded = frame.encode()?;

        let (delivered, attempted) = self.mesh.broadcast(&encoded, None).await;
        if attempted > 0 && delivered == 0 {
            return Err(GossipError::Publish(format!(
                "none of {} peers accepted the frame",
                attempted
            )));
        }

        trace!("Published {} to {} peers", frame.message.context, delivered);
        Ok(())
    }

    async fn peer_count(&self) -> usize {
        self.mesh.peers.read().await.len()
    }

    async fn leave(&self) {
        if self.mesh.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.mesh.endpoint.close();
        self.mesh.peers.write().await.clear();
        debug!("Left gossip room");
    }
}
