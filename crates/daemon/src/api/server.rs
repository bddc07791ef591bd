/// RPC server implementation

use super::handlers::*;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

/// HTTP server exposing the directory RPC methods
pub struct RpcServer {
    listener: TcpListener,
    state: AppState,
}

impl RpcServer {
    /// Bind the listener without serving yet
    pub async fn bind(listen_addr: SocketAddr, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("Failed to bind RPC server on {}", listen_addr))?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Routes served by the daemon
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/rpc", post(rpc))
            .route("/health", get(health_check))
            .route("/status", get(get_status))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Self::router(self.state);
        info!("RPC server listening on {}", self.listener.local_addr()?);

        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("RPC server error: {}", e))?;

        info!("RPC server stopped");
        Ok(())
    }
}
