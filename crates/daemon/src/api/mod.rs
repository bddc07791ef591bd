/// HTTP surface of the directory daemon
///
/// - `POST /rpc`: JSON-RPC calls to the `Directory.*` methods
/// - `GET /health`: liveness probe
/// - `GET /status`: node and store diagnostics

pub mod handlers;
pub mod responses;
pub mod server;

pub use handlers::AppState;
pub use responses::*;
pub use server::RpcServer;
