/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Kind-tagged resource envelope used to read and write resource files.

use super::agents::AgentVersion;
use super::configurations::Configuration;
use super::resources::{
    Destination, DestinationType, Processor, ProcessorType, Resource, ResourceKind, Source,
    SourceType,
};
use serde::{Deserialize, Serialize};

/// Any resource that can be applied to the store from a file.
///
/// Agents are not included: they register themselves by connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AnyResource {
    AgentVersion(AgentVersion),
    Source(Source),
    SourceType(SourceType),
    Processor(Processor),
    ProcessorType(ProcessorType),
    Destination(Destination),
    DestinationType(DestinationType),
    Configuration(Configuration),
}

impl AnyResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            AnyResource::AgentVersion(_) => AgentVersion::KIND,
            AnyResource::Source(_) => Source::KIND,
            AnyResource::SourceType(_) => SourceType::KIND,
            AnyResource::Processor(_) => Processor::KIND,
            AnyResource::ProcessorType(_) => ProcessorType::KIND,
            AnyResource::Destination(_) => Destination::KIND,
            AnyResource::DestinationType(_) => DestinationType::KIND,
            AnyResource::Configuration(_) => Configuration::KIND,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnyResource::AgentVersion(r) => r.unique_key(),
            AnyResource::Source(r) => r.unique_key(),
            AnyResource::SourceType(r) => r.unique_key(),
            AnyResource::Processor(r) => r.unique_key(),
            AnyResource::ProcessorType(r) => r.unique_key(),
            AnyResource::Destination(r) => r.unique_key(),
            AnyResource::DestinationType(r) => r.unique_key(),
            AnyResource::Configuration(r) => r.unique_key(),
        }
    }

    /// Parses a multi-document YAML stream, one resource per document.
    pub fn from_yaml_documents(input: &str) -> Result<Vec<AnyResource>, serde_yaml::Error> {
        let mut resources = Vec::new();
        for document in serde_yaml::Deserializer::from_str(input) {
            let value = serde_yaml::Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            resources.push(serde_yaml::from_value(value)?);
        }
        Ok(resources)
    }
}
