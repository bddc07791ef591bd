/// Typed RPC surface of the directory
///
/// Method names map to [`Method`] through a static table; parameters are
/// decoded into the typed request before reaching the [`DirectoryApi`].

use super::DirectoryService;
use crate::protocol::{AddRequest, ListRequest, ListResponse, RemoveRequest, StatusResponse};
use dirnet_common::config::rpc::{DIRECTORY_ADD, DIRECTORY_LIST, DIRECTORY_REMOVE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[async_trait::async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn list(&self, request: ListRequest) -> ListResponse;

    async fn add(&self, request: AddRequest) -> StatusResponse;

    async fn remove(&self, request: RemoveRequest) -> StatusResponse;
}

#[async_trait::async_trait]
impl DirectoryApi for DirectoryService {
    async fn list(&self, request: ListRequest) -> ListResponse {
        DirectoryService::list(self, request).await
    }

    async fn add(&self, request: AddRequest) -> StatusResponse {
        DirectoryService::add(self, request).await
    }

    async fn remove(&self, request: RemoveRequest) -> StatusResponse {
        DirectoryService::remove(self, request).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    List,
    Add,
    Remove,
}

const METHODS: &[(&str, Method)] = &[
    (DIRECTORY_LIST, Method::List),
    (DIRECTORY_ADD, Method::Add),
    (DIRECTORY_REMOVE, Method::Remove),
];

impl Method {
    /// Resolve a method name, ignoring ASCII case
    pub fn from_name(name: &str) -> Option<Self> {
        METHODS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(name))
            .map(|(_, method)| *method)
    }

    pub fn name(self) -> &'static str {
        METHODS
            .iter()
            .find(|(_, method)| *method == self)
            .map(|(name, _)| *name)
            .unwrap_or_default()
    }

    pub fn all() -> impl Iterator<Item = &'static str> {
        METHODS.iter().map(|(name, _)| *name)
    }
}

/// Decode `params`, call the named method and encode its result
///
/// `params` may be the request object itself or a one element array
/// holding it.
pub async fn dispatch(
    api: &dyn DirectoryApi,
    method: &str,
    params: Value,
) -> Result<Value, RpcError> {
    let method =
        Method::from_name(method).ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;

    match method {
        Method::List => encode(api.list(decode(params)?).await),
        Method::Add => encode(api.add(decode(params)?).await),
        Method::Remove => encode(api.remove(decode(params)?).await),
    }
}

fn decode<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    let object = match params {
        Value::Array(mut items) => {
            if items.len() != 1 {
                return Err(RpcError::InvalidParams(format!(
                    "expected exactly one parameter object, got {}",
                    items.len()
                )));
            }
            items.remove(0)
        }
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    serde_json::from_value(object).map_err(|e| RpcError::InvalidParams(e.to_string()))
}

fn encode<T: Serialize>(response: T) -> Result<Value, RpcError> {
    serde_json::to_value(response).map_err(|e| RpcError::Encode(e.to_string()))
}

/// RPC errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Failed to encode response: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyRegistry;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    struct NoopSink;

    #[async_trait::async_trait]
    impl crate::replication::ReplicationSink for NoopSink {
        async fn publish(
            &self,
            _event: crate::replication::ReplicationEvent,
        ) -> Result<(), crate::p2p::GossipError> {
            Ok(())
        }
    }

    fn service() -> DirectoryService {
        DirectoryService::new(PolicyRegistry::empty())
            .with_store(Arc::new(MemoryStore::new()))
            .with_replication(Arc::new(NoopSink))
    }

    #[test]
    fn test_method_table() {
        assert_eq!(Method::from_name("Directory.List"), Some(Method::List));
        assert_eq!(Method::from_name("directory.add"), Some(Method::Add));
        assert_eq!(Method::from_name("Directory.Purge"), None);
        assert_eq!(Method::Remove.name(), "Directory.Remove");
        assert_eq!(Method::all().count(), 3);
    }

    #[tokio::test]
    async fn test_dispatch_add_and_list() {
        let service = service();

        let added = dispatch(
            &service,
            "Directory.Add",
            json!([{"Name": "pairing", "Entry": "abc123", "Mode": "short"}]),
        )
        .await
        .unwrap();
        assert_eq!(added, json!({"status": "success"}));

        let listed = dispatch(&service, "Directory.List", json!({"name": "pairing"}))
            .await
            .unwrap();
        assert_eq!(listed, json!({"name": "pairing", "entries": ["abc123"]}));

        let removed = dispatch(
            &service,
            "Directory.Remove",
            json!([{"name": "pairing", "entry": "abc123"}]),
        )
        .await
        .unwrap();
        assert_eq!(removed, json!({"status": "success"}));
    }

    #[tokio::test]
    async fn test_dispatch_errors() {
        let service = service();

        assert_eq!(
            dispatch(&service, "Directory.Nope", json!([])).await,
            Err(RpcError::UnknownMethod("Directory.Nope".to_string()))
        );
        assert!(matches!(
            dispatch(&service, "Directory.List", json!([{}, {}])).await,
            Err(RpcError::InvalidParams(_))
        ));
        assert!(matches!(
            dispatch(&service, "Directory.List", json!(["pairing"])).await,
            Err(RpcError::InvalidParams(_))
        ));
    }
}
