/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Transport seam between the manager and connected agents.
//!
//! Several protocols may be registered with one manager. The manager hands
//! every agent update to every protocol, so an implementation must ignore
//! agents it does not own. Updates for the same agent may arrive out of order
//! across batches; the latest call describes the desired state.

use crate::manager::AgentUpdates;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_models::models::Agent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("agent {0} is not connected")]
    NotConnected(String),
    #[error("failed to send to agent {agent_id}: {reason}")]
    Send { agent_id: String, reason: String },
    #[error("protocol shutdown failed: {0}")]
    Shutdown(String),
}

/// A request for an agent to report what it is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Include a snapshot of the agent's telemetry.
    #[serde(default)]
    pub snapshot: bool,
    /// Restrict the snapshot to this pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
}

#[async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;

    fn connected(&self, agent_id: &str) -> bool;

    async fn connected_agent_ids(&self) -> Result<Vec<String>, ProtocolError>;

    /// Drops the agent's connection. Returns false if it was not connected here.
    fn disconnect(&self, agent_id: &str) -> bool;

    async fn update_agent(
        &self,
        agent: &Agent,
        updates: &AgentUpdates,
    ) -> Result<(), ProtocolError>;

    async fn send_heartbeat(&self, agent_id: &str) -> Result<(), ProtocolError>;

    async fn request_report(&self, agent_id: &str, report: &Report) -> Result<(), ProtocolError>;

    async fn shutdown(&self) -> Result<(), ProtocolError>;
}
