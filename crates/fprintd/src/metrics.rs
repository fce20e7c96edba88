//! Prometheus /metrics + liveness HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics   Prometheus text format
//!   GET /healthz   liveness probe, always 200 while the process runs

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::sync::Arc;

type Labels = Vec<(String, String)>;

/// Pipeline counters, registered once at startup
#[derive(Clone)]
pub struct Metrics {
    pub stable_events: Counter,
    pub files_hashed: Counter,
    pub files_skipped: Family<Labels, Counter>,
    pub failures: Family<Labels, Counter>,
    pub registrations: Family<Labels, Counter>,
    pub hash_duration: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("stable_events", &self.stable_events.get())
            .field("files_hashed", &self.files_hashed.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let stable_events = Counter::default();
        let files_hashed = Counter::default();
        let files_skipped = Family::default();
        let failures = Family::default();
        let registrations = Family::default();
        let hash_duration = Histogram::new([0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 120.0]);

        registry.register(
            "fprint_stable_events",
            "Paths that settled after the debounce window",
            stable_events.clone(),
        );
        registry.register(
            "fprint_files_hashed",
            "Files fingerprinted successfully",
            files_hashed.clone(),
        );
        registry.register(
            "fprint_files_skipped",
            "Stable paths not fingerprinted, by reason",
            files_skipped.clone(),
        );
        registry.register(
            "fprint_failures",
            "Per-file pipeline failures, by stage",
            failures.clone(),
        );
        registry.register(
            "fprint_registrations",
            "Registration calls, by outcome",
            registrations.clone(),
        );
        registry.register(
            "fprint_hash_duration_seconds",
            "Wall time spent hashing one file",
            hash_duration.clone(),
        );

        Metrics {
            stable_events,
            files_hashed,
            files_skipped,
            failures,
            registrations,
            hash_duration,
        }
    }

    /// Metrics bound to a throwaway registry
    #[cfg(test)]
    pub fn unregistered() -> Self {
        Self::new(&mut Registry::default())
    }

    pub fn label(key: &str, value: &str) -> Labels {
        vec![(key.to_string(), value.to_string())]
    }
}

/// Serve Prometheus metrics and liveness on `addr` (e.g. "127.0.0.1:9464")
pub async fn serve(addr: String, registry: Arc<Registry>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
