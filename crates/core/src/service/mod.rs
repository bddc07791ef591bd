/// Directory request handling
///
/// `DirectoryService` implements the List / Add / Remove operations;
/// `rpc` exposes them by method name.

pub mod directory;
pub mod rpc;

pub use directory::DirectoryService;
pub use rpc::{dispatch, DirectoryApi, Method, RpcError};
