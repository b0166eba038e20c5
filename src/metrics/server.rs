//! `/metrics` and `/health` over HTTP.
//!
//! The binary pushes a fresh snapshot into the exporter state on every
//! status tick; handlers only read it.

use super::{MetricsRegistry, MetricsSnapshot};
use crate::engine::RunState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Exporter state shared between the binary and the handlers.
pub type SharedExporter = Arc<RwLock<ExporterState>>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("metrics server failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Latest engine view plus the registry it was written into.
pub struct ExporterState {
    registry: MetricsRegistry,
    halted: bool,
    reading: bool,
}

impl ExporterState {
    pub fn new(registry: MetricsRegistry) -> Self {
        Self {
            registry,
            halted: false,
            reading: false,
        }
    }

    pub fn update(&mut self, snapshot: &MetricsSnapshot) {
        self.halted = snapshot.run_state == RunState::Halted.code();
        self.reading = snapshot.is_reading;
        self.registry.update(snapshot);
    }
}

/// Serves the exporter until a shutdown future resolves.
pub struct MetricsServer {
    addr: SocketAddr,
    state: SharedExporter,
}

impl MetricsServer {
    /// Listens on all interfaces at `port`.
    pub fn on_port(port: u16, registry: MetricsRegistry) -> Self {
        Self::new(([0, 0, 0, 0], port).into(), registry)
    }

    pub fn new(addr: SocketAddr, registry: MetricsRegistry) -> Self {
        Self {
            addr,
            state: Arc::new(RwLock::new(ExporterState::new(registry))),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SharedExporter {
        Arc::clone(&self.state)
    }

    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.addr,
                source,
            })?;
        tracing::info!(addr = %self.addr, "Metrics server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        tracing::info!("Metrics server shut down");
        Ok(())
    }
}

fn router(state: SharedExporter) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics(State(state): State<SharedExporter>) -> Response {
    match state.read().await.registry.encode() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// 503 once the camera has halted; a supervisor should restart the kiosk.
async fn health(State(state): State<SharedExporter>) -> (StatusCode, &'static str) {
    let state = state.read().await;
    if state.halted {
        (StatusCode::SERVICE_UNAVAILABLE, "halted")
    } else if state.reading {
        (StatusCode::OK, "reading")
    } else {
        (StatusCode::OK, "starting")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineStats;
    use crate::recovery::FailureCounters;

    fn exporter() -> SharedExporter {
        MetricsServer::on_port(0, MetricsRegistry::new().unwrap()).state()
    }

    fn snapshot(state: RunState, frames: u64) -> MetricsSnapshot {
        MetricsSnapshot::from_engine(
            state,
            FailureCounters::default(),
            EngineStats {
                frames_emitted: frames,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_listens_on_requested_port() {
        let server = MetricsServer::on_port(9100, MetricsRegistry::new().unwrap());
        assert_eq!(server.addr().port(), 9100);
    }

    #[tokio::test]
    async fn test_health_follows_run_state() {
        let state = exporter();
        assert_eq!(
            health(State(Arc::clone(&state))).await,
            (StatusCode::OK, "starting")
        );

        state.write().await.update(&snapshot(RunState::Reading, 0));
        assert_eq!(
            health(State(Arc::clone(&state))).await,
            (StatusCode::OK, "reading")
        );

        state.write().await.update(&snapshot(RunState::Halted, 0));
        assert_eq!(
            health(State(state)).await,
            (StatusCode::SERVICE_UNAVAILABLE, "halted")
        );
    }

    #[tokio::test]
    async fn test_metrics_body_reflects_last_update() {
        let state = exporter();
        state.write().await.update(&snapshot(RunState::Reading, 12));

        let response = metrics(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("kiosk_camera_up 1"));
        assert!(text.contains("kiosk_camera_frames_emitted_total 12"));
    }
}
