/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! In-process [`Store`] implementation.
//!
//! Every write reserves a slot in the update relay, takes the state lock,
//! computes the batch of events it caused and hands the batch over before
//! releasing the lock, so batches are published in commit order. Writes that
//! change nothing emit nothing.

use super::events::{EventKind, Events};
use super::updates::Updates;
use super::{AgentUpdater, ResourceLister, Store, StoreError};
use crate::bus::{BusConfig, BusError, EventSource, UpdatesPermit, UpdatesRelay, UpdatesSender};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::Path;
use tether_models::models::{
    Agent, AgentVersion, AnyResource, Configuration, Destination, DestinationType, Labels,
    Processor, ProcessorType, Resource, ResourceKind, Source, SourceType,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Label an agent can carry to pick its configuration by name.
pub const CONFIGURATION_LABEL: &str = "configuration";

#[derive(Default)]
struct State {
    agents: BTreeMap<String, Agent>,
    agent_versions: BTreeMap<String, AgentVersion>,
    sources: BTreeMap<String, Source>,
    source_types: BTreeMap<String, SourceType>,
    processors: BTreeMap<String, Processor>,
    processor_types: BTreeMap<String, ProcessorType>,
    destinations: BTreeMap<String, Destination>,
    destination_types: BTreeMap<String, DestinationType>,
    configurations: BTreeMap<String, Configuration>,
}

/// Stores `item`, recording an insert or update. Identical items are skipped.
fn apply<T: Resource + PartialEq>(
    map: &mut BTreeMap<String, T>,
    events: &mut Events<T>,
    item: T,
) {
    let kind = match map.get(item.unique_key()) {
        Some(existing) if *existing == item => return,
        Some(_) => EventKind::Update,
        None => EventKind::Insert,
    };
    map.insert(item.unique_key().to_string(), item.clone());
    events.include(item, kind);
}

fn remove<T: Resource>(map: &mut BTreeMap<String, T>, events: &mut Events<T>, name: &str) {
    if let Some(item) = map.remove(name) {
        events.include(item, EventKind::Remove);
    }
}

fn validate(resource: &AnyResource) -> Result<(), StoreError> {
    let invalid = |reason: String| StoreError::Invalid {
        kind: resource.kind().to_string(),
        name: resource.name().to_string(),
        reason,
    };

    if resource.name().trim().is_empty() {
        return Err(invalid("name cannot be empty".to_string()));
    }
    if let AnyResource::Configuration(configuration) = resource {
        let selector: Labels = configuration.selector.match_labels.clone().into_iter().collect();
        selector.validate().map_err(invalid)?;
    }
    Ok(())
}

pub struct MemoryStore {
    state: RwLock<State>,
    updates: EventSource<Updates>,
    sender: UpdatesSender,
    cancel: CancellationToken,
}

impl MemoryStore {
    /// Creates an empty store and starts its update relay.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: BusConfig) -> Self {
        let updates = EventSource::new();
        let cancel = CancellationToken::new();
        let (sender, _relay) = UpdatesRelay::spawn(config, updates.clone(), cancel.clone());
        Self {
            state: RwLock::new(State::default()),
            updates,
            sender,
            cancel,
        }
    }

    /// Stops the update relay after it publishes what it has accumulated.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Hands a write's batch to the relay. Called with the state lock held.
    fn publish(permit: Result<UpdatesPermit<'_>, BusError>, updates: &Updates) {
        if updates.is_empty() {
            return;
        }
        debug!(size = updates.size(), "store changed");
        match permit {
            Ok(permit) => permit.send(updates.clone()),
            Err(e) => warn!(error = %e, "dropping store updates"),
        }
    }

    /// Inserts or replaces resources.
    ///
    /// All resources are validated before any is stored.
    ///
    /// # Returns
    /// The batch of events the write caused.
    pub async fn apply_resources(
        &self,
        resources: Vec<AnyResource>,
    ) -> Result<Updates, StoreError> {
        for resource in &resources {
            validate(resource)?;
        }

        let permit = self.sender.reserve().await;
        let mut updates = Updates::new();
        {
            let mut state = self.state.write().await;
            for resource in resources {
                match resource {
                    AnyResource::AgentVersion(r) => {
                        apply(&mut state.agent_versions, &mut updates.agent_versions, r)
                    }
                    AnyResource::Source(r) => apply(&mut state.sources, &mut updates.sources, r),
                    AnyResource::SourceType(r) => {
                        apply(&mut state.source_types, &mut updates.source_types, r)
                    }
                    AnyResource::Processor(r) => {
                        apply(&mut state.processors, &mut updates.processors, r)
                    }
                    AnyResource::ProcessorType(r) => {
                        apply(&mut state.processor_types, &mut updates.processor_types, r)
                    }
                    AnyResource::Destination(r) => {
                        apply(&mut state.destinations, &mut updates.destinations, r)
                    }
                    AnyResource::DestinationType(r) => {
                        apply(&mut state.destination_types, &mut updates.destination_types, r)
                    }
                    AnyResource::Configuration(r) => {
                        apply(&mut state.configurations, &mut updates.configurations, r)
                    }
                }
            }
            Self::publish(permit, &updates);
        }
        Ok(updates)
    }

    /// Deletes resources by kind and name. Unknown names are ignored.
    pub async fn delete_resources(&self, targets: &[(ResourceKind, String)]) -> Updates {
        let permit = self.sender.reserve().await;
        let mut updates = Updates::new();
        {
            let mut state = self.state.write().await;
            for (kind, name) in targets {
                match kind {
                    ResourceKind::Agent => remove(&mut state.agents, &mut updates.agents, name),
                    ResourceKind::AgentVersion => {
                        remove(&mut state.agent_versions, &mut updates.agent_versions, name)
                    }
                    ResourceKind::Source => remove(&mut state.sources, &mut updates.sources, name),
                    ResourceKind::SourceType => {
                        remove(&mut state.source_types, &mut updates.source_types, name)
                    }
                    ResourceKind::Processor => {
                        remove(&mut state.processors, &mut updates.processors, name)
                    }
                    ResourceKind::ProcessorType => {
                        remove(&mut state.processor_types, &mut updates.processor_types, name)
                    }
                    ResourceKind::Destination => {
                        remove(&mut state.destinations, &mut updates.destinations, name)
                    }
                    ResourceKind::DestinationType => remove(
                        &mut state.destination_types,
                        &mut updates.destination_types,
                        name,
                    ),
                    ResourceKind::Configuration => {
                        remove(&mut state.configurations, &mut updates.configurations, name)
                    }
                }
            }
            Self::publish(permit, &updates);
        }
        updates
    }

    /// Reads a multi-document YAML file of resources and applies them.
    pub async fn load_resources_yaml(&self, path: impl AsRef<Path>) -> Result<Updates, StoreError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let resources = AnyResource::from_yaml_documents(&contents)?;
        info!("Loading {} resources from {}", resources.len(), path.display());
        self.apply_resources(resources).await
    }

    /// Replaces the custom labels of an agent, emitting a `Label` event when
    /// they change.
    pub async fn update_agent_labels(&self, id: &str, labels: &Labels) -> Result<Agent, StoreError> {
        labels.validate().map_err(|reason| StoreError::Invalid {
            kind: ResourceKind::Agent.to_string(),
            name: id.to_string(),
            reason,
        })?;

        let permit = self.sender.reserve().await;
        let mut updates = Updates::new();
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(id)
            .ok_or_else(|| StoreError::AgentNotFound(id.to_string()))?;
        if agent.custom_labels() != labels.custom() {
            agent.set_custom_labels(labels);
            updates.agents.include(agent.clone(), EventKind::Label);
        }
        let agent = agent.clone();
        Self::publish(permit, &updates);
        Ok(agent)
    }

    pub async fn agents(&self) -> Vec<Agent> {
        self.state.read().await.agents.values().cloned().collect()
    }

    pub async fn configuration(&self, name: &str) -> Option<Configuration> {
        self.state.read().await.configurations.get(name).cloned()
    }

    pub async fn agent_versions(&self) -> Vec<AgentVersion> {
        self.state
            .read()
            .await
            .agent_versions
            .values()
            .cloned()
            .collect()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ResourceLister for MemoryStore {
    async fn sources(&self) -> Result<Vec<Source>, StoreError> {
        Ok(self.state.read().await.sources.values().cloned().collect())
    }

    async fn processors(&self) -> Result<Vec<Processor>, StoreError> {
        Ok(self.state.read().await.processors.values().cloned().collect())
    }

    async fn destinations(&self) -> Result<Vec<Destination>, StoreError> {
        Ok(self.state.read().await.destinations.values().cloned().collect())
    }

    async fn configurations(&self) -> Result<Vec<Configuration>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .configurations
            .values()
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn agent(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.state.read().await.agents.get(id).cloned())
    }

    /// New agents are recorded as `Insert`, label changes as `Label`, anything
    /// else as `Update`.
    async fn upsert_agent(&self, id: &str, updater: AgentUpdater) -> Result<Agent, StoreError> {
        let permit = self.sender.reserve().await;
        let mut updates = Updates::new();
        let agent = {
            let mut state = self.state.write().await;
            let existing = state.agents.get(id).cloned();
            let mut agent = match &existing {
                Some(agent) => agent.clone(),
                None => Agent::new(id, id).map_err(|reason| StoreError::Invalid {
                    kind: ResourceKind::Agent.to_string(),
                    name: id.to_string(),
                    reason,
                })?,
            };
            updater(&mut agent);
            agent.id = id.to_string();

            let kind = match &existing {
                None => Some(EventKind::Insert),
                Some(before) if *before == agent => None,
                Some(before) if before.custom_labels() != agent.custom_labels() => {
                    Some(EventKind::Label)
                }
                Some(_) => Some(EventKind::Update),
            };
            if let Some(kind) = kind {
                state.agents.insert(id.to_string(), agent.clone());
                updates.agents.include(agent.clone(), kind);
            }
            Self::publish(permit, &updates);
            agent
        };
        Ok(agent)
    }

    async fn agent_configuration(
        &self,
        agent: &Agent,
    ) -> Result<Option<Configuration>, StoreError> {
        let state = self.state.read().await;
        if let Some(configuration) = agent
            .labels
            .get(CONFIGURATION_LABEL)
            .and_then(|name| state.configurations.get(name))
        {
            return Ok(Some(configuration.clone()));
        }
        Ok(state
            .configurations
            .values()
            .find(|c| c.selects(&agent.labels))
            .cloned())
    }

    async fn agents_ids_matching_configuration(
        &self,
        configuration: &Configuration,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .agents
            .values()
            .filter(|agent| configuration.selects(&agent.labels))
            .map(|agent| agent.id.clone())
            .collect())
    }

    async fn cleanup_disconnected_agents(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Agent>, StoreError> {
        let permit = self.sender.reserve().await;
        let mut updates = Updates::new();
        let mut state = self.state.write().await;
        let expired: Vec<String> = state
            .agents
            .values()
            .filter(|agent| agent.disconnected_before(since))
            .map(|agent| agent.id.clone())
            .collect();
        let removed: Vec<Agent> = expired
            .iter()
            .filter_map(|id| state.agents.remove(id))
            .collect();
        for agent in &removed {
            updates.agents.include(agent.clone(), EventKind::Remove);
        }
        Self::publish(permit, &updates);
        Ok(removed)
    }

    fn updates(&self) -> &EventSource<Updates> {
        &self.updates
    }
}
