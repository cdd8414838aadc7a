/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Pipeline Resources
//!
//! The building blocks a [`Configuration`](super::configurations::Configuration)
//! is assembled from. Resources form a three-tier dependency graph:
//!
//! ```text
//! SourceType / ProcessorType / DestinationType      (type definitions)
//!            |
//! Source / Processor / Destination                  (named instances)
//!            |
//! Configuration                                     (agent pipeline)
//! ```
//!
//! Every resource is identified by its name, which is stable for its lifetime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The nine kinds of resource tracked by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Agent,
    AgentVersion,
    Source,
    SourceType,
    Processor,
    ProcessorType,
    Destination,
    DestinationType,
    Configuration,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Agent => "Agent",
            ResourceKind::AgentVersion => "AgentVersion",
            ResourceKind::Source => "Source",
            ResourceKind::SourceType => "SourceType",
            ResourceKind::Processor => "Processor",
            ResourceKind::ProcessorType => "ProcessorType",
            ResourceKind::Destination => "Destination",
            ResourceKind::DestinationType => "DestinationType",
            ResourceKind::Configuration => "Configuration",
        };
        write!(f, "{}", name)
    }
}

/// Anything that can be recorded in a change batch.
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    /// The kind of this resource.
    const KIND: ResourceKind;

    /// Stable, content-independent key of the resource.
    fn unique_key(&self) -> &str;
}

/// A named parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: serde_json::Value,
}

/// Declaration of a parameter accepted by a resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// Shared body of the three type definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

/// A reference from one resource to another, or an inline definition.
///
/// `name` refers to a named instance (`Source`, `Processor`, `Destination`);
/// `type_name` refers to a type definition used inline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<ResourceConfiguration>,
}

impl ResourceConfiguration {
    /// A reference to a named resource.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// An inline definition using a type.
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            ..Default::default()
        }
    }

    pub fn with_processors(mut self, processors: Vec<ResourceConfiguration>) -> Self {
        self.processors = processors;
        self
    }
}

/// A named source instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Processors applied to this source's telemetry.
    #[serde(default)]
    pub processors: Vec<ResourceConfiguration>,
}

impl Source {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            parameters: Vec::new(),
            processors: Vec::new(),
        }
    }

    pub fn with_processors(mut self, processors: Vec<ResourceConfiguration>) -> Self {
        self.processors = processors;
        self
    }
}

/// A named processor instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Processor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            parameters: Vec::new(),
        }
    }
}

/// A named destination instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl Destination {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            parameters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceType {
    pub name: String,
    #[serde(flatten)]
    pub spec: TypeSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorType {
    pub name: String,
    #[serde(flatten)]
    pub spec: TypeSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationType {
    pub name: String,
    #[serde(flatten)]
    pub spec: TypeSpec,
}

impl SourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: TypeSpec::default(),
        }
    }
}

impl ProcessorType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: TypeSpec::default(),
        }
    }
}

impl DestinationType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: TypeSpec::default(),
        }
    }
}

impl Resource for Source {
    const KIND: ResourceKind = ResourceKind::Source;
    fn unique_key(&self) -> &str {
        &self.name
    }
}

impl Resource for Processor {
    const KIND: ResourceKind = ResourceKind::Processor;
    fn unique_key(&self) -> &str {
        &self.name
    }
}

impl Resource for Destination {
    const KIND: ResourceKind = ResourceKind::Destination;
    fn unique_key(&self) -> &str {
        &self.name
    }
}

impl Resource for SourceType {
    const KIND: ResourceKind = ResourceKind::SourceType;
    fn unique_key(&self) -> &str {
        &self.name
    }
}

impl Resource for ProcessorType {
    const KIND: ResourceKind = ResourceKind::ProcessorType;
    fn unique_key(&self) -> &str {
        &self.name
    }
}

impl Resource for DestinationType {
    const KIND: ResourceKind = ResourceKind::DestinationType;
    fn unique_key(&self) -> &str {
        &self.name
    }
}
