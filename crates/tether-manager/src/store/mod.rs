/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Store
//!
//! The [`Store`] trait is the manager's view of resource state: agent lookups,
//! label matching, the resource listings used by cascade analysis, and the
//! source of update batches. [`memory::MemoryStore`] keeps everything in
//! process.

pub mod events;
pub mod memory;
pub mod updates;

use crate::bus::EventSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tether_models::models::{Agent, Configuration, Destination, Processor, Source};
use thiserror::Error;

pub use events::{Event, EventKind, Events};
pub use memory::MemoryStore;
pub use updates::{merge_updates, Updates};

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("invalid {kind} {name}: {reason}")]
    Invalid {
        kind: String,
        name: String,
        reason: String,
    },
    #[error("failed to read resources: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse resources: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Changes an agent in place during [`Store::upsert_agent`].
pub type AgentUpdater = Box<dyn FnOnce(&mut Agent) + Send>;

/// Lists the candidates considered by cascade analysis.
#[async_trait]
pub trait ResourceLister: Send + Sync {
    async fn sources(&self) -> Result<Vec<Source>, StoreError>;
    async fn processors(&self) -> Result<Vec<Processor>, StoreError>;
    async fn destinations(&self) -> Result<Vec<Destination>, StoreError>;
    async fn configurations(&self) -> Result<Vec<Configuration>, StoreError>;
}

#[async_trait]
pub trait Store: ResourceLister {
    async fn agent(&self, id: &str) -> Result<Option<Agent>, StoreError>;

    /// Creates the agent if needed, applies `updater` and stores the result.
    async fn upsert_agent(&self, id: &str, updater: AgentUpdater) -> Result<Agent, StoreError>;

    /// The configuration the agent should run, if any.
    async fn agent_configuration(
        &self,
        agent: &Agent,
    ) -> Result<Option<Configuration>, StoreError>;

    /// IDs of the agents whose labels match the configuration's selector.
    async fn agents_ids_matching_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<Vec<String>, StoreError>;

    /// Removes agents disconnected since before `since` and returns them.
    async fn cleanup_disconnected_agents(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Agent>, StoreError>;

    /// Source of the coalesced update batches.
    fn updates(&self) -> &EventSource<Updates>;
}
