/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Operational HTTP endpoint: liveness and Prometheus metrics.

use crate::metrics;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn router() -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
}

/// Health check endpoint handler
///
/// Returns a 200 OK status code with "OK" in the body.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Metrics endpoint handler
///
/// Returns every registered metric in Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

/// Serves the endpoint on `0.0.0.0:<port>` until `cancel` fires.
pub async fn serve(port: u16, cancel: CancellationToken) -> Result<(), std::io::Error> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Health endpoint listening on {}", addr);
    axum::serve(listener, router())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
