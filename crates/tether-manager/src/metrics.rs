/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Metrics Module
//!
//! This module provides Prometheus metrics for the Tether manager.
//! It exposes metrics about update batches, agent dispatches, and the update bus.

use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Global Prometheus registry for all manager metrics
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Update batches handled by the manager loop
pub static BATCHES_PROCESSED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "tether_batches_processed_total",
        "Total number of update batches handled by the manager",
    )
    .expect("Failed to create batches processed counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register batches processed counter");
    counter
});

/// Pending agent updates produced per batch
pub static PENDING_AGENT_UPDATES: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "tether_pending_agent_updates",
        "Number of agents with pending updates per batch",
    )
    .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]);
    let histogram =
        Histogram::with_opts(opts).expect("Failed to create pending agent updates histogram");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("Failed to register pending agent updates histogram");
    histogram
});

/// Dispatch duration histogram
pub static DISPATCH_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "tether_dispatch_duration_seconds",
        "Time taken to dispatch one batch of agent updates in seconds",
    )
    .buckets(vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]);
    let histogram =
        Histogram::with_opts(opts).expect("Failed to create dispatch duration histogram");
    REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("Failed to register dispatch duration histogram");
    histogram
});

/// Failed protocol calls
/// Labels: protocol, operation
pub static PROTOCOL_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "tether_protocol_failures_total",
        "Total number of failed protocol calls by protocol and operation",
    );
    let counter = CounterVec::new(opts, &["protocol", "operation"])
        .expect("Failed to create protocol failures counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register protocol failures counter");
    counter
});

/// Batches published by the update relay
/// Labels: reason
pub static RELAY_FLUSHES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let opts = Opts::new(
        "tether_relay_flushes_total",
        "Total number of coalesced batches published by the update relay by reason",
    );
    let counter =
        CounterVec::new(opts, &["reason"]).expect("Failed to create relay flushes counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register relay flushes counter");
    counter
});

/// Batches merged into an accumulating batch by the update relay
pub static RELAY_MERGES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "tether_relay_merges_total",
        "Total number of batches merged by the update relay",
    )
    .expect("Failed to create relay merges counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register relay merges counter");
    counter
});

/// Agents removed by the disconnected agent cleanup
pub static AGENTS_CLEANED_UP_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "tether_agents_cleaned_up_total",
        "Total number of disconnected agents removed by cleanup",
    )
    .expect("Failed to create agents cleaned up counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("Failed to register agents cleaned up counter");
    counter
});

/// Number of agents connected through any protocol, sampled by the heartbeat
pub static CONNECTED_AGENTS: Lazy<IntGauge> = Lazy::new(|| {
    let opts = Opts::new("tether_connected_agents", "Number of connected agents");
    let gauge = IntGauge::with_opts(opts).expect("Failed to create connected agents gauge");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("Failed to register connected agents gauge");
    gauge
});

/// Forces registration of every metric so they show up before first use.
pub fn init() {
    Lazy::force(&BATCHES_PROCESSED_TOTAL);
    Lazy::force(&PENDING_AGENT_UPDATES);
    Lazy::force(&DISPATCH_DURATION_SECONDS);
    Lazy::force(&PROTOCOL_FAILURES_TOTAL);
    Lazy::force(&RELAY_FLUSHES_TOTAL);
    Lazy::force(&RELAY_MERGES_TOTAL);
    Lazy::force(&AGENTS_CLEANED_UP_TOTAL);
    Lazy::force(&CONNECTED_AGENTS);
}

/// Encodes all registered metrics in Prometheus text format
///
/// # Returns
///
/// Returns a String containing all metrics in Prometheus exposition format,
/// or an empty string if encoding fails.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
