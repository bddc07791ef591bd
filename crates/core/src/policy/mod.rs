/// Namespace access policies
///
/// - Policy table and lookup (longest prefix match)
/// - Lock-free snapshot registry shared with request handlers
/// - Policy file watcher for hot reload

pub mod registry;
pub mod watcher;

pub use registry::{Policy, PolicyEntry, PolicyError, PolicyFile, PolicyRegistry, PolicyTable};
pub use watcher::PolicyWatcher;
