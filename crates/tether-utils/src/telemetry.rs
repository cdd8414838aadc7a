/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tether Telemetry Module
//!
//! OpenTelemetry-based distributed tracing for the Tether manager.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_utils::telemetry;
//!
//! let settings = tether_utils::Settings::new(None)?;
//! telemetry::init(&settings.telemetry.for_manager(), &settings.log.level, &settings.log.format)?;
//! ```
//!
//! When telemetry is disabled only the log subscriber is installed, which is
//! equivalent to [`crate::logging::init_with_format`].

use crate::config::ResolvedTelemetry;
use crate::logging;
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::{runtime, Resource};
use std::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Error type for telemetry initialization
#[derive(Debug)]
pub enum TelemetryError {
    /// Failed to create OTLP exporter
    ExporterError(String),
    /// Failed to set global subscriber
    SubscriberError(String),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::ExporterError(e) => write!(f, "OTLP exporter error: {}", e),
            TelemetryError::SubscriberError(e) => write!(f, "Subscriber error: {}", e),
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Maps a sampling rate onto a sampler; rates outside (0, 1) saturate.
pub fn sampler_for(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

/// Initialize tracing with the given configuration.
///
/// # Arguments
/// * `config` - Resolved telemetry configuration (from `Telemetry::for_manager()`)
/// * `log_level` - Log level filter string (e.g., "info", "debug")
/// * `log_format` - Log format ("text" or "json")
pub fn init(
    config: &ResolvedTelemetry,
    log_level: &str,
    log_format: &str,
) -> Result<(), TelemetryError> {
    if !config.enabled {
        return logging::init_with_format(log_level, log_format)
            .map_err(|e| TelemetryError::SubscriberError(e.to_string()));
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()
        .map_err(|e| TelemetryError::ExporterError(e.to_string()))?;

    let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler_for(config.sampling_rate))
        .with_resource(Resource::new(vec![
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                config.service_name.clone(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ]))
        .build();

    let tracer = tracer_provider.tracer(config.service_name.clone());
    opentelemetry::global::set_tracer_provider(tracer_provider);

    let subscriber = tracing_subscriber::registry()
        .with(logging::env_filter(log_level))
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    if log_format.eq_ignore_ascii_case("json") {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| TelemetryError::SubscriberError(e.to_string()))?;
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| TelemetryError::SubscriberError(e.to_string()))?;
    }

    Ok(())
}

/// Shutdown OpenTelemetry, flushing any pending traces.
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}
