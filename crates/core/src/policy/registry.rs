/// Namespace policy lookup
///
/// Policies are keyed by namespace prefix. A lookup picks the longest
/// configured prefix the namespace starts with; namespaces matching no
/// prefix get the unmanaged policy, which never requires a signature.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Access policy resolved for a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    /// Configured prefix that matched
    pub prefix: String,

    /// Signature algorithm pinned for the prefix
    pub algorithm: String,

    /// Hex encoded public key pinned for the prefix
    pub public_key: String,

    /// A valid signature is required to list the namespace
    pub confidential: bool,

    /// A valid signature is required to add to or remove from the namespace
    pub read_only: bool,
}

impl Policy {
    /// Policy for namespaces without configuration
    pub fn unmanaged() -> Self {
        Self::default()
    }

    pub fn is_unmanaged(&self) -> bool {
        self.prefix.is_empty() || self.algorithm.is_empty() || self.public_key.is_empty()
    }
}

/// One configured prefix, as found in the policy file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub algorithm: String,

    pub public_key: String,

    /// Other keys allowed to sign for the same prefix
    #[serde(default)]
    pub additional_keys: Vec<String>,

    #[serde(default)]
    pub confidential: bool,

    #[serde(default)]
    pub read_only: bool,
}

impl PolicyEntry {
    fn keys(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.public_key).chain(self.additional_keys.iter())
    }
}

/// On-disk policy file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFile {
    #[serde(default)]
    pub namespaces: BTreeMap<String, PolicyEntry>,
}

/// Immutable snapshot of every configured prefix
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    /// Sorted by prefix length, longest first
    entries: Vec<(String, PolicyEntry)>,
}

impl PolicyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from prefix -> entry pairs
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, PolicyEntry)>,
    ) -> Result<Self, PolicyError> {
        let mut entries: Vec<(String, PolicyEntry)> = entries.into_iter().collect();

        for (prefix, entry) in &entries {
            if prefix.is_empty() {
                return Err(PolicyError::InvalidEntry(
                    "namespace prefix must not be empty".to_string(),
                ));
            }
            if entry.algorithm.is_empty() || entry.public_key.is_empty() {
                return Err(PolicyError::InvalidEntry(format!(
                    "prefix {prefix:?} needs both an algorithm and a public key"
                )));
            }
        }

        entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(Self { entries })
    }

    /// Parse a TOML policy file
    pub fn from_toml(contents: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile =
            toml::from_str(contents).map_err(|e| PolicyError::Parse(e.to_string()))?;
        Self::from_entries(file.namespaces)
    }

    /// Resolve the policy for `namespace`
    ///
    /// When the matching prefix pins several keys, the one equal to
    /// `claimed_key` is selected; otherwise the primary key is returned.
    pub fn lookup(&self, namespace: &str, claimed_key: &str) -> Policy {
        let Some((prefix, entry)) = self
            .entries
            .iter()
            .find(|(prefix, _)| namespace.starts_with(prefix.as_str()))
        else {
            return Policy::unmanaged();
        };

        let public_key = entry
            .keys()
            .find(|key| key.as_str() == claimed_key)
            .unwrap_or(&entry.public_key)
            .clone();

        Policy {
            prefix: prefix.clone(),
            algorithm: entry.algorithm.clone(),
            public_key,
            confidential: entry.confidential,
            read_only: entry.read_only,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared, hot-swappable policy table
///
/// Lookups load the current snapshot without locking; a reload replaces the
/// whole snapshot at once so readers never see a partial table.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    table: Arc<ArcSwap<PolicyTable>>,
}

impl PolicyRegistry {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// Registry where every namespace is unmanaged
    pub fn empty() -> Self {
        Self::new(PolicyTable::empty())
    }

    pub fn lookup(&self, namespace: &str, claimed_key: &str) -> Policy {
        self.table.load().lookup(namespace, claimed_key)
    }

    /// Atomically install a new table
    pub fn replace(&self, table: PolicyTable) {
        self.table.store(Arc::new(table));
    }

    /// Number of configured prefixes in the current snapshot
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.load().is_empty()
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Policy configuration errors
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Failed to read policy file: {0}")]
    Read(String),

    #[error("Failed to parse policy file: {0}")]
    Parse(String),

    #[error("Invalid policy entry: {0}")]
    InvalidEntry(String),
}
