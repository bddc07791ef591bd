/// API request handlers

use super::responses::*;
use dirnet_common::NodeId;
use dirnet_core::service::Method;
use dirnet_core::{dispatch, DirectoryApi, DirectoryStore};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub node_id: NodeId,
    pub api: Arc<dyn DirectoryApi>,
    pub store: Arc<dyn DirectoryStore>,
}

/// Handler for POST /rpc
pub async fn rpc(
    State(state): State<AppState>,
    Json(request): Json<JsonRpcRequest>,
) -> Json<JsonRpcResponse> {
    debug!("API: POST /rpc {}", request.method);

    let response = match dispatch(state.api.as_ref(), &request.method, request.params).await {
        Ok(result) => JsonRpcResponse::success(request.id, result),
        Err(e) => {
            debug!("RPC {} failed: {}", request.method, e);
            JsonRpcResponse::failure(request.id, e.to_string())
        }
    };

    Json(response)
}

/// Handler for GET /status
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<NodeStatusResponse>, AppError> {
    debug!("API: GET /status");

    let store = state
        .store
        .status()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;

    Ok(Json(NodeStatusResponse {
        node_id: state.node_id.to_string(),
        methods: Method::all().map(str::to_string).collect(),
        store,
    }))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    debug!("API: GET /health");
    (StatusCode::OK, "OK")
}

/// Application error type
pub struct AppError {
    message: String,
    status_code: StatusCode,
}

impl AppError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API Error: {}", self.message);

        let body = Json(ErrorResponse::new(self.message, self.status_code.as_u16()));

        (self.status_code, body).into_response()
    }
}
