/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Update Batches
//!
//! An [`Updates`] batch holds one [`Events`] collection per resource kind and
//! is the unit published on the update bus.
//!
//! ## Cascade
//!
//! Resources depend on each other in three tiers:
//!
//! ```text
//! type (SourceType, ProcessorType, DestinationType)
//!   -> instance (Source, Processor, Destination)
//!     -> Configuration
//! ```
//!
//! A change to a lower tier can change what a higher tier renders to, so the
//! batch is extended with synthesized `Update` events for the dependents
//! ([`Updates::add_transitive_updates`]). Only `Update` events on types and
//! instances cascade: a freshly inserted resource cannot be referenced yet.
//! Configuration events never cascade further.

use super::events::{EventKind, Events};
use super::ResourceLister;
use tether_models::models::{
    Agent, AgentVersion, Configuration, Destination, DestinationType, Processor, ProcessorType,
    Resource, Source, SourceType,
};
use tracing::{debug, warn};

/// A batch of changes, one collection per resource kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    pub agents: Events<Agent>,
    pub agent_versions: Events<AgentVersion>,
    pub sources: Events<Source>,
    pub source_types: Events<SourceType>,
    pub processors: Events<Processor>,
    pub processor_types: Events<ProcessorType>,
    pub destinations: Events<Destination>,
    pub destination_types: Events<DestinationType>,
    pub configurations: Events<Configuration>,
}

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all collections.
    pub fn size(&self) -> usize {
        self.agents.len()
            + self.agent_versions.len()
            + self.sources.len()
            + self.source_types.len()
            + self.processors.len()
            + self.processor_types.len()
            + self.destinations.len()
            + self.destination_types.len()
            + self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// True if every collection can be merged with its counterpart in `other`.
    pub fn can_safely_merge(&self, other: &Updates) -> bool {
        self.agents.can_safely_merge(&other.agents)
            && self.agent_versions.can_safely_merge(&other.agent_versions)
            && self.sources.can_safely_merge(&other.sources)
            && self.source_types.can_safely_merge(&other.source_types)
            && self.processors.can_safely_merge(&other.processors)
            && self.processor_types.can_safely_merge(&other.processor_types)
            && self.destinations.can_safely_merge(&other.destinations)
            && self.destination_types.can_safely_merge(&other.destination_types)
            && self.configurations.can_safely_merge(&other.configurations)
    }

    // ------------------------------------------------------------------
    // Cascade predicates
    // ------------------------------------------------------------------

    pub fn could_affect_processors(&self) -> bool {
        !self.processor_types.is_empty()
    }

    pub fn could_affect_sources(&self) -> bool {
        !self.source_types.is_empty()
            || !self.processor_types.is_empty()
            || !self.processors.is_empty()
    }

    pub fn could_affect_destinations(&self) -> bool {
        !self.destination_types.is_empty()
    }

    /// Configuration events themselves are not considered.
    pub fn could_affect_configurations(&self) -> bool {
        !self.sources.is_empty()
            || !self.source_types.is_empty()
            || !self.processors.is_empty()
            || !self.processor_types.is_empty()
            || !self.destinations.is_empty()
            || !self.destination_types.is_empty()
    }

    /// True if the source's type, or a processor attached to it, was updated.
    pub fn affects_source(&self, source: &Source) -> bool {
        if self.source_types.contains(&source.type_name, EventKind::Update) {
            return true;
        }
        source.processors.iter().any(|processor| {
            let type_updated = processor
                .type_name
                .as_deref()
                .map(|t| self.processor_types.contains(t, EventKind::Update))
                .unwrap_or(false);
            let instance_updated = processor
                .name
                .as_deref()
                .map(|n| self.processors.contains(n, EventKind::Update))
                .unwrap_or(false);
            type_updated || instance_updated
        })
    }

    pub fn affects_processor(&self, processor: &Processor) -> bool {
        self.processor_types
            .contains(&processor.type_name, EventKind::Update)
    }

    pub fn affects_destination(&self, destination: &Destination) -> bool {
        self.destination_types
            .contains(&destination.type_name, EventKind::Update)
    }

    /// True if a source or destination the configuration references, by name
    /// or by type, has any event in this batch.
    pub fn affects_configuration(&self, configuration: &Configuration) -> bool {
        let sources = configuration.sources.iter().any(|source| {
            source
                .name
                .as_deref()
                .map(|n| self.sources.contains_key(n))
                .unwrap_or(false)
                || source
                    .type_name
                    .as_deref()
                    .map(|t| self.source_types.contains_key(t))
                    .unwrap_or(false)
        });
        if sources {
            return true;
        }
        configuration.destinations.iter().any(|destination| {
            destination
                .name
                .as_deref()
                .map(|n| self.destinations.contains_key(n))
                .unwrap_or(false)
                || destination
                    .type_name
                    .as_deref()
                    .map(|t| self.destination_types.contains_key(t))
                    .unwrap_or(false)
        })
    }

    // ------------------------------------------------------------------
    // Cascade
    // ------------------------------------------------------------------

    pub fn add_affected_sources(&mut self, sources: &[Source]) {
        for source in sources {
            if self.sources.contains(source.unique_key(), EventKind::Update) {
                continue;
            }
            if self.affects_source(source) {
                self.sources.include(source.clone(), EventKind::Update);
            }
        }
    }

    pub fn add_affected_processors(&mut self, processors: &[Processor]) {
        for processor in processors {
            if self.processors.contains(processor.unique_key(), EventKind::Update) {
                continue;
            }
            if self.affects_processor(processor) {
                self.processors.include(processor.clone(), EventKind::Update);
            }
        }
    }

    pub fn add_affected_destinations(&mut self, destinations: &[Destination]) {
        for destination in destinations {
            if self
                .destinations
                .contains(destination.unique_key(), EventKind::Update)
            {
                continue;
            }
            if self.affects_destination(destination) {
                self.destinations
                    .include(destination.clone(), EventKind::Update);
            }
        }
    }

    pub fn add_affected_configurations(&mut self, configurations: &[Configuration]) {
        for configuration in configurations {
            if self
                .configurations
                .contains(configuration.unique_key(), EventKind::Update)
            {
                continue;
            }
            if self.affects_configuration(configuration) {
                self.configurations
                    .include(configuration.clone(), EventKind::Update);
            }
        }
    }

    /// Walks the dependency graph bottom-up, adding `Update` events for every
    /// resource affected by the changes already in the batch.
    ///
    /// Candidates are listed only when a tier could be affected. A failed
    /// listing is logged and that tier is skipped for this batch.
    pub async fn add_transitive_updates<L>(&mut self, lister: &L)
    where
        L: ResourceLister + ?Sized,
    {
        if self.could_affect_processors() {
            match lister.processors().await {
                Ok(processors) => self.add_affected_processors(&processors),
                Err(e) => warn!(error = %e, "failed to list processors for cascade"),
            }
        }

        if self.could_affect_sources() {
            match lister.sources().await {
                Ok(sources) => self.add_affected_sources(&sources),
                Err(e) => warn!(error = %e, "failed to list sources for cascade"),
            }
        }

        if self.could_affect_destinations() {
            match lister.destinations().await {
                Ok(destinations) => self.add_affected_destinations(&destinations),
                Err(e) => warn!(error = %e, "failed to list destinations for cascade"),
            }
        }

        if self.could_affect_configurations() {
            match lister.configurations().await {
                Ok(configurations) => self.add_affected_configurations(&configurations),
                Err(e) => warn!(error = %e, "failed to list configurations for cascade"),
            }
        }

        debug!(size = self.size(), "cascade complete");
    }
}

/// Merges `from` into `into`.
///
/// The merge is all-or-nothing: if any key in any collection holds an
/// incompatible pair of events, false is returned and `into` is not modified.
pub fn merge_updates(into: &mut Updates, from: &Updates) -> bool {
    if !into.can_safely_merge(from) {
        return false;
    }
    into.agents.merge(&from.agents);
    into.agent_versions.merge(&from.agent_versions);
    into.sources.merge(&from.sources);
    into.source_types.merge(&from.source_types);
    into.processors.merge(&from.processors);
    into.processor_types.merge(&from.processor_types);
    into.destinations.merge(&from.destinations);
    into.destination_types.merge(&from.destination_types);
    into.configurations.merge(&from.configurations);
    true
}
