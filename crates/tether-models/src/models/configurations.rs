/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Configuration Module
//!
//! A configuration is a named agent pipeline. It lists the sources and
//! destinations it is built from and selects the agents it applies to with a
//! label selector.

use super::labels::{AgentSelector, Labels};
use super::resources::{Resource, ResourceConfiguration, ResourceKind};
use serde::{Deserialize, Serialize};

/// A named pipeline definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    /// Incremented on every change to the pipeline.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub selector: AgentSelector,
    #[serde(default)]
    pub sources: Vec<ResourceConfiguration>,
    #[serde(default)]
    pub destinations: Vec<ResourceConfiguration>,
    /// Raw collector configuration, used instead of sources/destinations when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl Configuration {
    /// Creates a configuration selecting agents labeled `configuration=<name>`.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            selector: AgentSelector::new([("configuration", name.as_str())]),
            name,
            ..Default::default()
        }
    }

    pub fn with_selector(mut self, selector: AgentSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_sources(mut self, sources: Vec<ResourceConfiguration>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_destinations(mut self, destinations: Vec<ResourceConfiguration>) -> Self {
        self.destinations = destinations;
        self
    }

    /// True if an agent with these labels should run this configuration.
    pub fn selects(&self, labels: &Labels) -> bool {
        self.selector.matches(labels)
    }
}

impl Resource for Configuration {
    const KIND: ResourceKind = ResourceKind::Configuration;
    fn unique_key(&self) -> &str {
        &self.name
    }
}
