/// API request and response types

use dirnet_core::StoreStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request
///
/// `params` is usually a one element array holding the request object.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub method: String,

    #[serde(default)]
    pub params: Value,

    #[serde(default)]
    pub id: Value,
}

/// JSON-RPC response; exactly one of `result` and `error` is set
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub result: Value,
    pub error: Option<String>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            result,
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            error: Some(error.into()),
            id,
        }
    }
}

/// Node status response
#[derive(Debug, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    /// Node ID
    pub node_id: String,
    /// Supported RPC methods
    pub methods: Vec<String>,
    /// Store diagnostics
    pub store: StoreStatus,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: error.into(),
            status_code,
        }
    }
}
