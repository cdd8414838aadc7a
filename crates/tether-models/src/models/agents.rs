/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Agent Module
//!
//! An agent is a managed telemetry collector. The manager tracks its identity,
//! connection status and labels, and drives upgrades through the `upgrade`
//! field.

use super::labels::{Labels, RESERVED_LABEL_PREFIX};
use super::resources::{Resource, ResourceKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label holding the agent id.
pub const LABEL_AGENT_ID: &str = "tether/agent-id";
/// Label holding the agent name.
pub const LABEL_AGENT_NAME: &str = "tether/agent-name";
/// Label holding the agent version.
pub const LABEL_AGENT_VERSION: &str = "tether/agent-version";

/// Connection status reported for an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Disconnected,
    Connected,
    Configuring,
    Upgrading,
    ComponentFailed,
    Error,
    Deleted,
}

/// Progress of an agent upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    Pending,
    Started,
    Failed,
}

/// A requested upgrade of an agent to another version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUpgrade {
    pub version: String,
    pub status: UpgradeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disconnected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub upgrade: Option<AgentUpgrade>,
}

impl Agent {
    /// Creates a disconnected agent with its manager-owned labels set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        let name = name.into();

        if id.trim().is_empty() {
            return Err("Agent id cannot be empty".to_string());
        }
        if name.trim().is_empty() {
            return Err("Name cannot be empty".to_string());
        }

        let mut labels = Labels::new();
        labels.insert(LABEL_AGENT_ID, id.clone());
        labels.insert(LABEL_AGENT_NAME, name.clone());

        Ok(Agent {
            id,
            name,
            version: String::new(),
            status: AgentStatus::Disconnected,
            labels,
            connected_at: None,
            disconnected_at: None,
            upgrade: None,
        })
    }

    /// Labels set by users, without the `tether/agent-` ones.
    pub fn custom_labels(&self) -> Labels {
        self.labels.custom()
    }

    /// Replaces the custom labels, keeping the manager-owned ones.
    pub fn set_custom_labels(&mut self, custom: &Labels) {
        let mut labels = self.labels.reserved();
        for (key, value) in custom.iter() {
            if !key.starts_with(RESERVED_LABEL_PREFIX) {
                labels.insert(key.clone(), value.clone());
            }
        }
        self.labels = labels;
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
        self.labels.insert(LABEL_AGENT_VERSION, self.version.clone());
    }

    pub fn upgrade_pending(&self) -> bool {
        matches!(
            self.upgrade,
            Some(AgentUpgrade {
                status: UpgradeStatus::Pending,
                ..
            })
        )
    }

    /// Target version of a pending upgrade.
    pub fn pending_upgrade_version(&self) -> Option<&str> {
        match &self.upgrade {
            Some(upgrade) if upgrade.status == UpgradeStatus::Pending => {
                Some(upgrade.version.as_str())
            }
            _ => None,
        }
    }

    pub fn mark_connected(&mut self, at: DateTime<Utc>) {
        self.status = AgentStatus::Connected;
        self.connected_at = Some(at);
        self.disconnected_at = None;
    }

    pub fn mark_disconnected(&mut self, at: DateTime<Utc>) {
        self.status = AgentStatus::Disconnected;
        self.disconnected_at = Some(at);
    }

    /// True if the agent has been disconnected since before `cutoff`.
    pub fn disconnected_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == AgentStatus::Disconnected
            && self.disconnected_at.map(|at| at < cutoff).unwrap_or(false)
    }
}

impl Resource for Agent {
    const KIND: ResourceKind = ResourceKind::Agent;
    fn unique_key(&self) -> &str {
        &self.id
    }
}

/// A released agent version that agents can be upgraded to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentVersion {
    pub name: String,
    pub version: String,
    /// Download URL keyed by platform, e.g. `linux/amd64`.
    #[serde(default)]
    pub download_urls: BTreeMap<String, String>,
}

impl AgentVersion {
    pub fn new(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            name: version.clone(),
            version,
            download_urls: BTreeMap::new(),
        }
    }
}

impl Resource for AgentVersion {
    const KIND: ResourceKind = ResourceKind::AgentVersion;
    fn unique_key(&self) -> &str {
        &self.name
    }
}
