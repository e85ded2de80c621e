//! HTTP front end of the verification gateway.
//!
//! Exposes the subscriber side of the publish/subscribe binding:
//! - `GET /health` for transport liveness checks
//! - `POST /publish/{topic}` delivering one message to the gateway
//! - `GET /stats` with the pipeline counters
//!
//! ```text
//! producer ──→ POST /publish/vitals/readings ──→ Router ──→ accepted sink
//!                                                   └────→ rejected sink
//! ```
//!
//! Delivery is acknowledged with `202` whatever the verdict: a publisher
//! learns nothing about why a message was rejected.

use crate::gateway::Router;
use crate::stats::{SharedStats, StatsSnapshot};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Upper bound on an inbound message body.
pub const MAX_BODY_BYTES: usize = 4 * 1024;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Topic the gateway subscribes to
    pub topic: String,
    /// Verdict router for delivered messages
    pub router: Router,
    /// Counters exposed on `/stats`
    pub stats: Option<SharedStats>,
}

impl ServerConfig {
    pub fn new(port: u16, topic: impl Into<String>, router: Router) -> Self {
        Self {
            port,
            topic: topic.into(),
            router,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// Shared server state
struct ServerState {
    topic: String,
    router: Router,
    stats: Option<SharedStats>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Delivery acknowledgement
#[derive(Serialize)]
pub struct DeliveryResponse {
    pub status: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /publish/{topic}
///
/// Hands the raw body to the router. Verification and sink I/O run on the
/// blocking pool.
async fn publish(
    State(state): State<Arc<ServerState>>,
    Path(topic): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<DeliveryResponse>), ApiError> {
    let topic = topic.trim_matches('/');
    if topic != state.topic {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No subscriber for topic '{topic}'"),
                code: "UNKNOWN_TOPIC".to_string(),
            }),
        ));
    }

    let router = state.router.clone();
    tokio::task::spawn_blocking(move || router.dispatch(&body))
        .await
        .map_err(|e| {
            tracing::error!("Verification task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Verification task failed".to_string(),
                    code: "INTERNAL".to_string(),
                }),
            )
        })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DeliveryResponse {
            status: "delivered".to_string(),
        }),
    ))
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Result<Json<StatsSnapshot>, ApiError> {
    match state.stats {
        Some(ref stats) => Ok(Json(stats.snapshot())),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Statistics are not enabled".to_string(),
                code: "NO_STATS".to_string(),
            }),
        )),
    }
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState {
        topic: config.topic.trim_matches('/').to_string(),
        router: config.router,
        stats: config.stats,
    });

    let app = axum::Router::new()
        .route("/health", get(health))
        .route("/publish/*topic", post(publish))
        .route("/stats", get(stats))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Verification gateway listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
