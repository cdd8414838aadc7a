/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Agent versions offered for upgrades.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tether_models::models::AgentVersion;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionsError {
    #[error("unknown agent version: {0}")]
    NotFound(String),
    #[error("no agent versions available")]
    Empty,
}

#[async_trait]
pub trait Versions: Send + Sync {
    async fn version(&self, name: &str) -> Result<AgentVersion, VersionsError>;

    async fn latest_version(&self) -> Result<AgentVersion, VersionsError>;
}

/// Serves a fixed set of versions.
#[derive(Debug, Clone, Default)]
pub struct StaticVersions {
    versions: BTreeMap<String, AgentVersion>,
    latest: Option<String>,
}

impl StaticVersions {
    /// `latest` names one of `versions`; when unset the last version given wins.
    pub fn new(versions: Vec<AgentVersion>, latest: Option<String>) -> Self {
        let latest = latest.or_else(|| versions.last().map(|v| v.name.clone()));
        Self {
            versions: versions.into_iter().map(|v| (v.name.clone(), v)).collect(),
            latest,
        }
    }
}

impl From<&tether_utils::config::Versions> for StaticVersions {
    fn from(config: &tether_utils::config::Versions) -> Self {
        let versions = config
            .available
            .iter()
            .map(|v| AgentVersion::new(v.as_str()))
            .collect();
        StaticVersions::new(versions, config.latest.clone())
    }
}

#[async_trait]
impl Versions for StaticVersions {
    async fn version(&self, name: &str) -> Result<AgentVersion, VersionsError> {
        self.versions
            .get(name)
            .cloned()
            .ok_or_else(|| VersionsError::NotFound(name.to_string()))
    }

    async fn latest_version(&self) -> Result<AgentVersion, VersionsError> {
        let name = self.latest.as_deref().ok_or(VersionsError::Empty)?;
        self.version(name).await
    }
}
