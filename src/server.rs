//! # Probe Server
//!
//! axum server with three routes:
//! - `/metrics` renders the crate registry in the Prometheus text format
//! - `/healthz` answers 200 while the process runs
//! - `/readyz` answers 200 only while the default variable baseline is in
//!   place, 503 before the first restore and during a re-restore
//!
//! Binds `0.0.0.0` on `METRICS_PORT` (8080 unless configured).

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared readiness flag, flipped by the restore
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn mark_ready(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            info!("Default variables in place, reporting ready");
        }
    }

    pub fn mark_restoring(&self) {
        if self.0.swap(false, Ordering::AcqRel) {
            debug!("Restore in progress, reporting not ready");
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub fn router(readiness: Readiness) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/healthz", get(|| async { StatusCode::OK }))
        .route("/readyz", get(report_readiness))
        .with_state(readiness)
}

/// Serve until the listener fails
///
/// # Errors
///
/// Bind and accept-loop failures.
pub async fn start_server(port: u16, readiness: Readiness) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port = port, "Probe server listening");
    axum::serve(listener, router(readiness)).await?;
    Ok(())
}

async fn render_metrics() -> Response {
    let mut body = Vec::new();
    match TextEncoder::new().encode(&crate::metrics::REGISTRY.gather(), &mut body) {
        Ok(()) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn report_readiness(State(readiness): State<Readiness>) -> StatusCode {
    if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_is_shared_between_clones() {
        let readiness = Readiness::default();
        let probe = readiness.clone();
        assert!(!probe.is_ready());

        readiness.mark_ready();
        assert!(probe.is_ready());

        readiness.mark_restoring();
        assert!(!probe.is_ready());
    }
}
