use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// RPC surface constants
pub mod rpc {
    /// Default server port
    pub const DEFAULT_PORT: u16 = 4242;

    /// Default server hostname
    pub const DEFAULT_HOSTNAME: &str = "localhost";

    /// Method name for listing a namespace
    pub const DIRECTORY_LIST: &str = "Directory.List";

    /// Method name for adding an entry
    pub const DIRECTORY_ADD: &str = "Directory.Add";

    /// Method name for removing an entry
    pub const DIRECTORY_REMOVE: &str = "Directory.Remove";
}

/// Directory store constants
pub mod directory {
    /// Symbolic mode for short-lived entries
    pub const MODE_SHORT: &str = "short";

    /// Symbolic mode for long-lived entries
    pub const MODE_LONG: &str = "long";

    pub const SHORT_TTL_SECS: u64 = 60;

    pub const DEFAULT_TTL_SECS: u64 = 5 * 60;

    pub const LONG_TTL_SECS: u64 = 60 * 60;

    /// Smallest TTL a store accepts
    pub const MIN_TTL_SECS: u64 = 1;

    /// Interval between expired entry sweeps
    pub const CLEANUP_INTERVAL_SECS: u64 = 30;
}

/// Signature window constants
pub mod auth {
    /// Requests are accepted if their timestamp is within this many
    /// nanoseconds of the verifier clock, in either direction.
    pub const TIMESTAMP_WINDOW_NANOS: i64 = 24 * 60 * 60 * 1_000_000_000;

    /// The only supported signature algorithm
    pub const ALGORITHM_ED25519: &str = "ed25519";
}

/// Gossip and liveness constants
pub mod p2p {
    /// Default room joined by nodes
    pub const DEFAULT_ROOM: &str = "dirnet";

    /// Default QUIC port for the gossip mesh
    pub const DEFAULT_LISTEN_PORT: u16 = 4343;

    /// Context (and legacy payload name) marking a heartbeat
    pub const HEARTBEAT: &str = "p2p.heartbeat";

    /// Interval between liveness checks and heartbeat publications
    pub const TICK_INTERVAL_SECS: u64 = 30;

    /// Liveness window before the first heartbeat is observed
    pub const STARTUP_TIMEOUT_SECS: u64 = 15 * 60;

    /// Liveness window once the network has been seen
    pub const STEADY_TIMEOUT_SECS: u64 = 3 * 60;

    /// Maximum size of a single gossip frame (1 MB)
    pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

    /// Number of frame ids remembered for duplicate suppression
    pub const SEEN_CACHE_SIZE: usize = 4096;

    /// Capacity of the inbound message queue
    pub const INBOX_CAPACITY: usize = 1024;
}

/// Daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerSection,
    pub directory: DirectorySection,
    pub p2p: P2pSection,
    pub policy: PolicySection,
    pub log: LogSection,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address the RPC server binds to
    pub hostname: String,

    /// Port the RPC server binds to
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            hostname: rpc::DEFAULT_HOSTNAME.to_string(),
            port: rpc::DEFAULT_PORT,
        }
    }
}

/// `[directory]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    /// Store backend: `"default"` or `"memory"`
    pub backend: String,

    /// Seconds between expired entry sweeps
    pub cleanup_interval_secs: u64,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            backend: "default".to_string(),
            cleanup_interval_secs: directory::CLEANUP_INTERVAL_SECS,
        }
    }
}

/// `[p2p]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct P2pSection {
    /// UDP port for the QUIC gossip mesh
    pub listen_port: u16,

    /// Comma separated `host:port` list of peers to dial on startup
    pub bootstrap: String,

    /// Room name shared by every node of the network
    pub room: String,

    /// Optional hex encoded 32 byte seed for the node key
    pub seed: Option<String>,
}

impl Default for P2pSection {
    fn default() -> Self {
        Self {
            listen_port: p2p::DEFAULT_LISTEN_PORT,
            bootstrap: String::new(),
            room: p2p::DEFAULT_ROOM.to_string(),
            seed: None,
        }
    }
}

impl P2pSection {
    /// Bootstrap addresses split on commas, blanks removed
    pub fn bootstrap_peers(&self) -> Vec<String> {
        self.bootstrap
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// `[policy]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// TOML file describing namespace policies
    pub file: Option<PathBuf>,

    /// Seconds between modification checks of the policy file
    pub reload_interval_secs: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            file: None,
            reload_interval_secs: 10,
        }
    }
}

/// `[log]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl DaemonConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: impl Into<String>) -> Self {
        self.p2p.bootstrap = bootstrap.into();
        self
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.p2p.room = room.into();
        self
    }

    pub fn with_policy_file(mut self, path: PathBuf) -> Self {
        self.policy.file = Some(path);
        self
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.directory.cleanup_interval_secs.max(1))
    }

    pub fn policy_reload_interval(&self) -> Duration {
        Duration::from_secs(self.policy.reload_interval_secs.max(1))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
