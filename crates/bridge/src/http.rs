//! Local HTTP front for the execution bridge.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hostlink_types::{EventResult, TriggerPayload, TriggerResponse};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bridge::ExecutionBridge;

/// Host configuration for the bridge HTTP server.
#[derive(Debug, Clone)]
pub struct BridgeHttpServer {
    bind_address: SocketAddr,
    bridge: Arc<ExecutionBridge>,
}

impl BridgeHttpServer {
    pub fn new(bind_address: SocketAddr, bridge: Arc<ExecutionBridge>) -> Self {
        Self { bind_address, bridge }
    }

    /// Start the server and return a handle for inspection and shutdown.
    pub async fn start(self) -> Result<RunningBridgeHttpServer> {
        let cancellation_token = CancellationToken::new();
        let router = bridge_router(Arc::clone(&self.bridge));
        let listener = tokio::net::TcpListener::bind(self.bind_address).await?;
        let bound_address = listener.local_addr()?;
        info!(address = %bound_address, "bridge HTTP server listening");

        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                if let Err(error) = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await
                {
                    warn!(error = %error, "bridge HTTP server exited with error");
                }
            }
        });

        Ok(RunningBridgeHttpServer {
            bind_address: bound_address,
            cancellation_token,
            server_handle,
        })
    }
}

/// Runtime handle for a running bridge HTTP server.
#[derive(Debug)]
pub struct RunningBridgeHttpServer {
    bind_address: SocketAddr,
    cancellation_token: CancellationToken,
    server_handle: JoinHandle<()>,
}

impl RunningBridgeHttpServer {
    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// `http://{bound_address}`, suitable for a client base URL.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.bind_address)
    }

    /// Stop the server and wait for in-flight requests to finish.
    pub async fn stop(self) -> Result<()> {
        self.cancellation_token.cancel();
        self.server_handle
            .await
            .map_err(|error| anyhow!("bridge HTTP server task failed: {error}"))?;
        info!("bridge HTTP server stopped");
        Ok(())
    }
}

/// Routes served by the bridge.
pub fn bridge_router(bridge: Arc<ExecutionBridge>) -> Router {
    Router::new()
        .route("/events/trigger", post(trigger_event))
        .route("/events/status/{event_id}", get(event_status))
        .route("/health", get(health))
        .with_state(bridge)
}

async fn trigger_event(State(bridge): State<Arc<ExecutionBridge>>, payload: Result<Json<TriggerPayload>, JsonRejection>) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let operation = payload.operation.unwrap_or_default();
    match bridge.submit(&operation, payload.params.unwrap_or_default()) {
        Ok(event_id) => (StatusCode::OK, Json(TriggerResponse::processing(event_id))).into_response(),
        Err(error) => error_response(StatusCode::BAD_REQUEST, error.to_string()),
    }
}

async fn event_status(State(bridge): State<Arc<ExecutionBridge>>, Path(event_id): Path<String>) -> Response {
    let result = bridge.status(&event_id);
    let status_code = match result {
        EventResult::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    (status_code, Json(result)).into_response()
}

async fn health(State(bridge): State<Arc<ExecutionBridge>>) -> Response {
    Json(json!({
        "status": "ok",
        "pending": bridge.pending_len(),
        "stored": bridge.stored_len(),
    }))
    .into_response()
}

fn error_response(status_code: StatusCode, message: String) -> Response {
    (status_code, Json(json!({ "status": "error", "message": message }))).into_response()
}

/// Resolve a safe local bind address for the bridge HTTP server.
pub fn resolve_bind_address(bind_address: Option<&str>) -> Result<SocketAddr> {
    let address = bind_address.unwrap_or("127.0.0.1:0");
    let parsed: SocketAddr = address
        .parse()
        .map_err(|error| anyhow!("invalid bridge bind address '{address}': {error}"))?;
    if !parsed.ip().is_loopback() {
        return Err(anyhow!("bridge HTTP server must bind to a loopback address"));
    }
    Ok(parsed)
}
