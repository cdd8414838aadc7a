/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Test fixtures: a protocol that records every call and a manager wired to
//! an in-memory store.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_manager::bus::BusConfig;
use tether_manager::manager::{AgentUpdates, Manager, ManagerConfig};
use tether_manager::protocol::{Protocol, ProtocolError, Report};
use tether_manager::store::{MemoryStore, Store};
use tether_manager::versions::StaticVersions;
use tether_models::models::{Agent, AgentVersion, AnyResource, Labels};

#[derive(Default)]
pub struct RecordingProtocol {
    name: String,
    connected: Mutex<HashSet<String>>,
    updates: Mutex<Vec<(String, AgentUpdates)>>,
    heartbeats: Mutex<Vec<String>>,
    reports: Mutex<Vec<(String, Report)>>,
    fail_updates_for: Mutex<HashSet<String>>,
    panic_updates_for: Mutex<HashSet<String>>,
    shutdowns: AtomicUsize,
    fail_shutdown: AtomicBool,
}

impl RecordingProtocol {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn connect(&self, agent_id: &str) {
        self.connected.lock().unwrap().insert(agent_id.to_string());
    }

    pub fn fail_updates_for(&self, agent_id: &str) {
        self.fail_updates_for
            .lock()
            .unwrap()
            .insert(agent_id.to_string());
    }

    /// Makes `update_agent` panic for this agent, before anything is recorded.
    pub fn panic_updates_for(&self, agent_id: &str) {
        self.panic_updates_for
            .lock()
            .unwrap()
            .insert(agent_id.to_string());
    }

    pub fn fail_shutdown(&self) {
        self.fail_shutdown.store(true, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<(String, AgentUpdates)> {
        let mut updates = self.updates.lock().unwrap().clone();
        updates.sort_by(|a, b| a.0.cmp(&b.0));
        updates
    }

    pub fn updates_for(&self, agent_id: &str) -> Vec<AgentUpdates> {
        self.updates()
            .into_iter()
            .filter(|(id, _)| id == agent_id)
            .map(|(_, u)| u)
            .collect()
    }

    pub fn heartbeats(&self) -> Vec<String> {
        let mut heartbeats = self.heartbeats.lock().unwrap().clone();
        heartbeats.sort();
        heartbeats
    }

    pub fn reports(&self) -> Vec<(String, Report)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Protocol for RecordingProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    fn connected(&self, agent_id: &str) -> bool {
        self.connected.lock().unwrap().contains(agent_id)
    }

    async fn connected_agent_ids(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self.connected.lock().unwrap().iter().cloned().collect())
    }

    fn disconnect(&self, agent_id: &str) -> bool {
        self.connected.lock().unwrap().remove(agent_id)
    }

    async fn update_agent(
        &self,
        agent: &Agent,
        updates: &AgentUpdates,
    ) -> Result<(), ProtocolError> {
        let panics = self.panic_updates_for.lock().unwrap().contains(&agent.id);
        if panics {
            panic!("update for {} blew up", agent.id);
        }
        self.updates
            .lock()
            .unwrap()
            .push((agent.id.clone(), updates.clone()));
        if self.fail_updates_for.lock().unwrap().contains(&agent.id) {
            return Err(ProtocolError::Send {
                agent_id: agent.id.clone(),
                reason: "connection reset".to_string(),
            });
        }
        Ok(())
    }

    async fn send_heartbeat(&self, agent_id: &str) -> Result<(), ProtocolError> {
        self.heartbeats.lock().unwrap().push(agent_id.to_string());
        Ok(())
    }

    async fn request_report(&self, agent_id: &str, report: &Report) -> Result<(), ProtocolError> {
        self.reports
            .lock()
            .unwrap()
            .push((agent_id.to_string(), report.clone()));
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ProtocolError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err(ProtocolError::Shutdown("already closed".to_string()));
        }
        Ok(())
    }
}

/// A manager with one recording protocol over an empty in-memory store.
pub struct TestFixture {
    pub store: Arc<MemoryStore>,
    pub protocol: Arc<RecordingProtocol>,
    pub manager: Arc<Manager>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        Self::build(config, |manager| manager)
    }

    /// Builds the fixture, letting `customize` adjust the manager before it
    /// is shared.
    pub fn build(config: ManagerConfig, customize: impl FnOnce(Manager) -> Manager) -> Self {
        let store = Arc::new(MemoryStore::new(BusConfig {
            channel_size: 64,
            debounce: Duration::from_millis(200),
            max_events: 10_000,
        }));
        let versions = Arc::new(StaticVersions::new(
            vec![AgentVersion::new("1.0.0"), AgentVersion::new("1.1.0")],
            None,
        ));
        let protocol = RecordingProtocol::new("recording");

        let mut manager = customize(Manager::new(config, store.clone(), versions));
        manager.enable_protocol(protocol.clone());

        Self {
            store,
            protocol,
            manager: Arc::new(manager),
        }
    }

    /// Creates an agent with the given custom labels, optionally connected.
    pub async fn agent(&self, id: &str, labels: &str, connected: bool) -> Agent {
        let labels = Labels::parse(labels).unwrap();
        let agent = self
            .store
            .upsert_agent(id, Box::new(move |a| a.set_custom_labels(&labels)))
            .await
            .unwrap();
        if connected {
            self.protocol.connect(id);
        }
        agent
    }

    pub async fn apply(&self, resources: Vec<AnyResource>) {
        self.store.apply_resources(resources).await.unwrap();
    }
}

/// Polls until `condition` holds, advancing time in steps of 10ms.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
