/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Tether Logging Module
//!
//! Logging for the Tether crates is done with the `tracing` macros. This module
//! installs the subscriber and maps configured levels onto its filter.
//!
//! ## Usage
//!
//! 1. Initialize the logger (or [`crate::telemetry::init`] when traces are exported):
//!    ```rust,ignore
//!    tether_utils::logging::init("info")?;
//!    ```
//!
//! 2. Use the log macros throughout your code:
//!    ```rust,ignore
//!    use tether_utils::logging::prelude::*;
//!    info!(agent_id = %id, "agent connected");
//!    ```
//!
//! ## Log Levels
//!
//! - "off", "error", "warn", "info" (default), "debug", "trace"
//!
//! Unknown level strings fall back to "info". When `RUST_LOG` is set it takes
//! precedence over the configured level at startup.

use std::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use tracing::{debug, error, info, trace, warn};

/// Error type for logger setup
#[derive(Debug)]
pub enum LoggingError {
    /// The global subscriber could not be installed
    SubscriberError(String),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::SubscriberError(e) => write!(f, "Subscriber error: {}", e),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Initializes text logging at the given level.
pub fn init(level: &str) -> Result<(), LoggingError> {
    init_with_format(level, "text")
}

/// Initializes logging with the specified level and format.
///
/// # Arguments
/// * `level` - String representation of the log level ("debug", "info", "warn", "error")
/// * `format` - Log output format ("text" for human-readable, "json" for structured JSON)
pub fn init_with_format(level: &str, format: &str) -> Result<(), LoggingError> {
    let subscriber = tracing_subscriber::registry().with(env_filter(level));

    if format.eq_ignore_ascii_case("json") {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| LoggingError::SubscriberError(e.to_string()))
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| LoggingError::SubscriberError(e.to_string()))
    }
}

/// The level filter for `level`, unless `RUST_LOG` overrides it.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_directive(level)))
}

/// Maps a configured level onto a filter directive.
pub fn level_directive(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "off" => "off",
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    }
}

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}
