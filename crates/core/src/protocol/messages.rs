use crate::auth::{entry_message, list_message, Credentials};
use dirnet_common::config::p2p::HEARTBEAT;
use dirnet_common::Status;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// `Directory.List` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[serde(default, alias = "Name")]
    pub name: String,

    /// Maximum number of entries returned; zero or negative means all
    #[serde(default, alias = "Limit")]
    pub limit: i64,

    #[serde(flatten)]
    pub credentials: Credentials,
}

impl ListRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Message the signature must cover
    pub fn canonical_message(&self) -> String {
        list_message(&self.name, self.credentials.timestamp)
    }
}

/// `Directory.List` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(alias = "Name")]
    pub name: String,

    /// Never null; an empty namespace yields an empty list
    #[serde(default, alias = "Entries")]
    pub entries: Vec<String>,
}

impl ListResponse {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }
}

/// `Directory.Add` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Entry")]
    pub entry: String,

    /// Symbolic TTL class resolved by the store
    #[serde(default, alias = "Mode")]
    pub mode: String,

    #[serde(flatten)]
    pub credentials: Credentials,
}

impl AddRequest {
    pub fn new(name: impl Into<String>, entry: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            mode: mode.into(),
            credentials: Credentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn canonical_message(&self) -> String {
        entry_message(&self.name, self.credentials.timestamp, &self.entry)
    }
}

/// `Directory.Remove` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    #[serde(default, alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Entry")]
    pub entry: String,

    #[serde(flatten)]
    pub credentials: Credentials,
}

impl RemoveRequest {
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            credentials: Credentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn canonical_message(&self) -> String {
        entry_message(&self.name, self.credentials.timestamp, &self.entry)
    }
}

/// `Directory.Add` / `Directory.Remove` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(alias = "Status")]
    pub status: Status,
}

impl StatusResponse {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
        }
    }

    pub fn error() -> Self {
        Self {
            status: Status::Error,
        }
    }
}

/// Message exchanged on the gossip room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    /// Selects the handler on the receiving side
    pub context: String,

    /// Operation specific JSON
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl GossipMessage {
    pub fn new<T: Serialize>(
        context: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            context: context.into(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Heartbeats are marked by their context or, for older peers, by the
    /// payload name
    pub fn is_heartbeat(&self) -> bool {
        self.context == HEARTBEAT
            || self
                .payload
                .get("name")
                .or_else(|| self.payload.get("Name"))
                .and_then(serde_json::Value::as_str)
                == Some(HEARTBEAT)
    }
}

/// Payload of a replicated directory write
///
/// Carries no signature: peers apply it as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPayload {
    #[serde(alias = "Name")]
    pub name: String,

    #[serde(default, alias = "Entry")]
    pub entry: String,

    #[serde(default, alias = "Mode")]
    pub mode: String,
}

impl From<&AddRequest> for EntryPayload {
    fn from(request: &AddRequest) -> Self {
        Self {
            name: request.name.clone(),
            entry: request.entry.clone(),
            mode: request.mode.clone(),
        }
    }
}

impl From<&RemoveRequest> for EntryPayload {
    fn from(request: &RemoveRequest) -> Self {
        Self {
            name: request.name.clone(),
            entry: request.entry.clone(),
            mode: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_request_wire_format() {
        let request: ListRequest = serde_json::from_value(json!({
            "name": "pairing",
            "limit": 2,
            "publicKey": "aa",
            "algorithm": "ed25519",
            "signature": "bb",
            "timestamp": 1_700_000_000_123_456_789i64,
        }))
        .unwrap();

        assert_eq!(request.name, "pairing");
        assert_eq!(request.limit, 2);
        assert_eq!(request.credentials.public_key, "aa");
        assert_eq!(request.canonical_message(), "pairing.1700000000123");
    }

    #[test]
    fn test_add_request_accepts_legacy_names() {
        let request: AddRequest = serde_json::from_value(json!({
            "Name": "pairing",
            "Entry": "abc123",
            "Mode": "short",
        }))
        .unwrap();

        assert_eq!(request, AddRequest::new("pairing", "abc123", "short"));
        assert!(request.credentials.is_empty());
        assert_eq!(request.canonical_message(), "pairing.0.abc123");
    }

    #[test]
    fn test_responses_serialize() {
        let list = serde_json::to_value(ListResponse::empty("pairing")).unwrap();
        assert_eq!(list, json!({"name": "pairing", "entries": []}));

        let status = serde_json::to_value(StatusResponse::success()).unwrap();
        assert_eq!(status, json!({"status": "success"}));
    }

    #[test]
    fn test_gossip_heartbeat_detection() {
        let by_context = GossipMessage {
            context: HEARTBEAT.to_string(),
            payload: serde_json::Value::Null,
        };
        assert!(by_context.is_heartbeat());

        let legacy = GossipMessage {
            context: "Directory.Add".to_string(),
            payload: json!({"Name": HEARTBEAT, "Entry": "1700000000", "Mode": "short"}),
        };
        assert!(legacy.is_heartbeat());

        let write = GossipMessage::new(
            "Directory.Add",
            &EntryPayload {
                name: "pairing".to_string(),
                entry: "xyz".to_string(),
                mode: "short".to_string(),
            },
        )
        .unwrap();
        assert!(!write.is_heartbeat());
        assert_eq!(write.parse_payload::<EntryPayload>().unwrap().entry, "xyz");
    }

    #[test]
    fn test_entry_payload_ignores_signature_fields() {
        let payload: EntryPayload = serde_json::from_value(json!({
            "name": "secure",
            "entry": "v1",
            "mode": "default",
            "publicKey": "aa",
            "signature": "bb",
        }))
        .unwrap();
        assert_eq!(payload.name, "secure");

        assert!(serde_json::from_value::<EntryPayload>(json!({"entry": "v1"})).is_err());
    }
}
