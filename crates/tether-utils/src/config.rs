/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tether Config Module
//! This module provides the configuration framework shared by the Tether crates.
//!
//! # Variable Naming Convention
//!
//! - Struct fields use snake_case (e.g., `manager`, `log_level`)
//! - Environment variables use SCREAMING_SNAKE_CASE and are prefixed with "TETHER__" (e.g., `TETHER__LOG__LEVEL`)
//! - Configuration file keys use snake_case (e.g., `log.level`, `bus.debounce_ms`)
//!
//! # Configuration Overriding
//!
//! The configuration values are loaded and overridden in the following order (later sources take precedence):
//!
//! 1. Default values from the embedded `default.toml` file
//! 2. Values from an optional external configuration file (if provided)
//! 3. Environment variables
//!
//! # Available Environment Variables
//!
//! - `TETHER__LOG__LEVEL`: log level ("trace", "debug", "info", "warn", "error"). Default: "info"
//! - `TETHER__LOG__FORMAT`: "text" or "json". Default: "text"
//! - `TETHER__MANAGER__SECRET_KEY`: secret key agents must present. Default: unset (any key accepted)
//! - `TETHER__MANAGER__AGENT_CLEANUP_INTERVAL_SECONDS`: how often disconnected agents are evicted. Default: 60
//! - `TETHER__MANAGER__AGENT_CLEANUP_TTL_SECONDS`: how long an agent may stay disconnected. Default: 900
//! - `TETHER__MANAGER__HEARTBEAT_INTERVAL_SECONDS`: heartbeat period. Default: 30
//! - `TETHER__MANAGER__HEARTBEAT_ENABLED`: schedule heartbeats in the manager loop. Default: false
//! - `TETHER__MANAGER__MAX_DISPATCH_WORKERS`: upper bound of concurrent agent dispatches. Default: 10
//! - `TETHER__MANAGER__SUBSCRIPTION_CAPACITY`: buffer of the manager's update subscription. Default: 10000
//! - `TETHER__BUS__CHANNEL_SIZE`: buffer of the store's update ingestion channel. Default: 1000
//! - `TETHER__BUS__DEBOUNCE_MS`: window in which adjacent update batches are merged. Default: 200
//! - `TETHER__BUS__MAX_EVENTS`: maximum events in one merged batch. Default: 10000
//! - `TETHER__SERVER__HEALTH_PORT`: port of the health and metrics endpoint. Default: 8686
//! - `TETHER__TELEMETRY__ENABLED`: export traces over OTLP. Default: false

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

// Include the default settings file as a string constant
const DEFAULT_SETTINGS: &str = include_str!("../default.toml");

/// Represents the main settings structure for the application
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Logging configuration
    pub log: Log,
    /// Manager configuration
    pub manager: Manager,
    /// Update bus configuration
    pub bus: Bus,
    /// Health/metrics server configuration
    pub server: Server,
    /// Agent versions offered for upgrades
    pub versions: Versions,
    /// Telemetry configuration
    pub telemetry: Telemetry,
}

/// Represents the logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,
    /// Log format: "text" for human-readable, "json" for structured JSON
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Represents the manager configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Manager {
    /// Secret key agents must present; any key is accepted when unset
    pub secret_key: Option<String>,
    /// Interval of the disconnected agent cleanup in seconds
    pub agent_cleanup_interval_seconds: u64,
    /// How long an agent may stay disconnected before it is removed, in seconds
    pub agent_cleanup_ttl_seconds: u64,
    /// Interval of agent heartbeats in seconds
    pub heartbeat_interval_seconds: u64,
    /// Whether heartbeats are scheduled by the manager loop
    #[serde(default)]
    pub heartbeat_enabled: bool,
    /// Maximum number of concurrent dispatch workers
    pub max_dispatch_workers: usize,
    /// Buffer size of the manager's updates subscription
    pub subscription_capacity: usize,
}

impl Manager {
    pub fn agent_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.agent_cleanup_interval_seconds)
    }

    pub fn agent_cleanup_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_cleanup_ttl_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }
}

/// Represents the update bus configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Bus {
    /// Buffer size of the ingestion channel fed by store writes
    pub channel_size: usize,
    /// Window in milliseconds during which adjacent batches are merged
    pub debounce_ms: u64,
    /// Maximum number of events in a merged batch
    pub max_events: usize,
}

impl Bus {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Represents the health/metrics server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Server {
    /// Port of the health and metrics endpoint
    pub health_port: Option<u16>,
}

/// Agent versions available for upgrades
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Versions {
    /// Latest released version
    pub latest: Option<String>,
    /// All versions agents may be upgraded to
    #[serde(default)]
    pub available: Vec<String>,
}

/// Represents the telemetry (OpenTelemetry) configuration with manager overrides
#[derive(Debug, Deserialize, Clone)]
pub struct Telemetry {
    /// Whether telemetry is enabled (base default)
    #[serde(default)]
    pub enabled: bool,
    /// OTLP endpoint for trace export (gRPC)
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,
    /// Service name for traces
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Sampling rate (0.0 to 1.0)
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    /// Manager-specific overrides
    #[serde(default)]
    pub manager: TelemetryOverride,
}

/// Component-specific telemetry overrides (all fields optional)
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryOverride {
    pub enabled: Option<bool>,
    pub otlp_endpoint: Option<String>,
    pub service_name: Option<String>,
    pub sampling_rate: Option<f64>,
}

/// Resolved telemetry configuration after merging base with overrides
#[derive(Debug, Clone)]
pub struct ResolvedTelemetry {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub sampling_rate: f64,
}

impl Telemetry {
    /// Get resolved telemetry config for the manager (base merged with manager overrides)
    pub fn for_manager(&self) -> ResolvedTelemetry {
        ResolvedTelemetry {
            enabled: self.manager.enabled.unwrap_or(self.enabled),
            otlp_endpoint: self
                .manager
                .otlp_endpoint
                .clone()
                .unwrap_or_else(|| self.otlp_endpoint.clone()),
            service_name: self
                .manager
                .service_name
                .clone()
                .unwrap_or_else(|| format!("{}-manager", self.service_name)),
            sampling_rate: self.manager.sampling_rate.unwrap_or(self.sampling_rate),
        }
    }
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "tether".to_string()
}

fn default_sampling_rate() -> f64 {
    0.1
}

impl Settings {
    /// Creates a new `Settings` instance
    ///
    /// # Arguments
    ///
    /// * `file` - An optional path to a configuration file
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Settings` instance or a `ConfigError`
    pub fn new(file: Option<String>) -> Result<Self, ConfigError> {
        let mut s = Config::builder()
            .add_source(File::from_str(DEFAULT_SETTINGS, config::FileFormat::Toml));

        s = match file {
            Some(x) => s.add_source(File::with_name(x.as_str())),
            None => s,
        };

        // Environment variables prefixed with "TETHER" and using "__" as a separator
        s = s.add_source(Environment::with_prefix("TETHER").separator("__"));

        s.build()?.try_deserialize()
    }
}
