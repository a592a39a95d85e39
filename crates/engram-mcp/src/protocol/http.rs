//! HTTP Transport
//!
//! Two endpoints:
//!
//! - `POST /api/call` — a JSON-RPC-shaped body `{method: "tools/call",
//!   params: {name, arguments}}`; the tool result (or structured error)
//!   comes back as the response body
//! - `GET /health` — a small health object
//!
//! The session identifier comes from the `x-engram-session` header,
//! falling back to the peer address, so per-session GHAP state works
//! without client configuration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use engram_core::{
    Axis, CODE_UNITS_COLLECTION, COMMITS_COLLECTION, MEMORIES_COLLECTION, VALUES_COLLECTION,
};

use crate::engine::Engine;
use crate::server::McpServer;

/// Shared application state
struct AppState {
    engine: Arc<Engine>,
    /// Session store: session id → per-session server
    sessions: Mutex<HashMap<String, Arc<Mutex<McpServer>>>>,
}

/// HTTP transport configuration
pub struct HttpTransportConfig {
    pub host: String,
    pub port: u16,
}

/// HTTP transport
pub struct HttpTransport {
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self { config }
    }

    /// Run the HTTP server until shutdown
    pub async fn run(self, engine: Arc<Engine>) -> Result<(), std::io::Error> {
        let state = Arc::new(AppState {
            engine,
            sessions: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/api/call", post(handle_call))
            .route("/health", get(handle_health))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        info!("http server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("http server shutting down");
        Ok(())
    }
}

/// `POST /api/call` body
#[derive(Debug, Deserialize)]
struct CallBody {
    method: String,
    #[serde(default)]
    params: Option<CallParams>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Session id: explicit header first, then the peer address
fn session_id(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-engram-session")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("peer-{}", peer.ip()))
}

async fn session_server(state: &AppState, session_id: &str) -> Arc<Mutex<McpServer>> {
    let mut sessions = state.sessions.lock().await;
    sessions
        .entry(session_id.to_string())
        .or_insert_with(|| {
            info!("new http session: {}", session_id);
            Arc::new(Mutex::new(McpServer::new(
                state.engine.clone(),
                session_id.to_string(),
            )))
        })
        .clone()
}

async fn handle_call(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let body: CallBody = match serde_json::from_str(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!("malformed /api/call body: {}", e);
            return error_response(
                StatusCode::BAD_REQUEST,
                "validation_error",
                &format!("malformed request body: {}", e),
            );
        }
    };

    if body.method != "tools/call" {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            &format!("unsupported method '{}'; use tools/call", body.method),
        );
    }
    let Some(params) = body.params else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "missing params.name",
        );
    };

    let session = session_id(&headers, peer);
    let server = session_server(&state, &session).await;
    let server = server.lock().await;
    let result = server.dispatch(&params.name, params.arguments).await;

    match result {
        Ok(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload.to_string(),
        )
            .into_response(),
        Err(error) => {
            let status = match error.kind.as_str() {
                "validation_error" => StatusCode::BAD_REQUEST,
                "not_found" => StatusCode::NOT_FOUND,
                "active_ghap_exists" | "no_active_ghap" => StatusCode::CONFLICT,
                "timeout" => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                [(header::CONTENT_TYPE, "application/json")],
                error.to_json().to_string(),
            )
                .into_response()
        }
    }
}

/// Every collection the engine owns, for the health report
fn health_collections() -> Vec<&'static str> {
    let mut names = vec![
        MEMORIES_COLLECTION,
        CODE_UNITS_COLLECTION,
        COMMITS_COLLECTION,
        VALUES_COLLECTION,
    ];
    names.extend(Axis::ALL.iter().map(|axis| axis.collection_name()));
    names
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    // A missing collection counts as 0 (cold start); a store failure is a
    // real storage-unreachable condition and must not read as healthy
    let mut counts = serde_json::Map::new();
    let mut failure: Option<String> = None;
    for name in health_collections() {
        match state.engine.store.count(name, None) {
            Ok(count) => {
                counts.insert(name.to_string(), json!(count));
            }
            Err(e) => {
                warn!("health check: counting '{}' failed: {}", name, e);
                failure = Some(e.to_string());
                break;
            }
        }
    }

    let (status, body) = match failure {
        None => (
            StatusCode::OK,
            json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "uptime_seconds": state.engine.uptime_seconds(),
                "collections": counts,
            }),
        ),
        Some(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "degraded",
                "version": env!("CARGO_PKG_VERSION"),
                "uptime_seconds": state.engine.uptime_seconds(),
                "reason": reason,
            }),
        ),
    };

    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = json!({ "error": { "kind": kind, "message": message } });
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Graceful shutdown on Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl+c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!("failed to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
