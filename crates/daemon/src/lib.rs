/// dirnet daemon library
///
/// HTTP JSON-RPC surface for a directory node.

pub mod api;

pub use api::{AppState, RpcServer};
