/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Manager
//!
//! The manager turns update batches into per-agent updates and hands them to
//! the registered protocols.
//!
//! ## Event Loop
//!
//! [`Manager::start`] subscribes to the store's update source and runs one
//! task that, per batch:
//!
//! 1. skips empty batches,
//! 2. extends the batch with cascaded updates ([`Updates::add_transitive_updates`]),
//! 3. collects at most one [`AgentUpdates`] per connected agent,
//! 4. dispatches them through a [`WorkerPool`], calling every protocol for
//!    every agent, and waits for the dispatch to finish.
//!
//! The same loop runs the disconnected agent cleanup on a fixed interval and,
//! when enabled, agent heartbeats. Cancellation is observed between
//! iterations; an in-flight dispatch always completes.
//!
//! Lookup and protocol failures are logged and skipped. Nothing is retried:
//! agents converge on a later batch or heartbeat.

pub mod dispatch;

use crate::clock::{Clock, SystemClock};
use crate::metrics;
use crate::protocol::{Protocol, ProtocolError, Report};
use crate::store::{AgentUpdater, EventKind, Store, StoreError, Updates};
use crate::versions::{Versions, VersionsError};
use dispatch::WorkerPool;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tether_models::models::{Agent, AgentVersion, Configuration, Labels};
use tether_utils::Settings;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Intervals must not be zero.
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Versions(#[from] VersionsError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("agent {0} is not connected")]
    NotConnected(String),
}

/// Changes to send to one agent. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Labels>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl AgentUpdates {
    pub fn is_empty(&self) -> bool {
        self.labels.is_none() && self.configuration.is_none() && self.version.is_none()
    }
}

/// Pending updates of one batch, keyed by agent ID.
pub type PendingUpdates = BTreeMap<String, (Agent, AgentUpdates)>;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Secret key agents must present; any key is accepted when unset.
    pub secret_key: Option<String>,
    pub agent_cleanup_interval: Duration,
    /// How long an agent may stay disconnected before cleanup removes it.
    pub agent_cleanup_ttl: Duration,
    pub heartbeat_interval: Duration,
    /// Heartbeats are only scheduled when set.
    pub heartbeat_enabled: bool,
    pub max_dispatch_workers: usize,
    pub subscription_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            agent_cleanup_interval: Duration::from_secs(60),
            agent_cleanup_ttl: Duration::from_secs(15 * 60),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_enabled: false,
            max_dispatch_workers: dispatch::DEFAULT_MAX_WORKERS,
            subscription_capacity: 10_000,
        }
    }
}

impl From<&Settings> for ManagerConfig {
    fn from(settings: &Settings) -> Self {
        let manager = &settings.manager;
        Self {
            secret_key: manager.secret_key.clone(),
            agent_cleanup_interval: manager.agent_cleanup_interval(),
            agent_cleanup_ttl: manager.agent_cleanup_ttl(),
            heartbeat_interval: manager.heartbeat_interval(),
            heartbeat_enabled: manager.heartbeat_enabled,
            max_dispatch_workers: manager.max_dispatch_workers,
            subscription_capacity: manager.subscription_capacity,
        }
    }
}

pub struct Manager {
    config: ManagerConfig,
    store: Arc<dyn Store>,
    versions: Arc<dyn Versions>,
    protocols: Vec<Arc<dyn Protocol>>,
    clock: Arc<dyn Clock>,
    pool: WorkerPool,
}

impl Manager {
    pub fn new(config: ManagerConfig, store: Arc<dyn Store>, versions: Arc<dyn Versions>) -> Self {
        let pool = WorkerPool::new(config.max_dispatch_workers);
        Self {
            config,
            store,
            versions,
            protocols: Vec::new(),
            clock: Arc::new(SystemClock),
            pool,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a protocol. Protocols are fixed once the manager starts.
    pub fn enable_protocol(&mut self, protocol: Arc<dyn Protocol>) {
        info!("Enabling protocol {}", protocol.name());
        self.protocols.push(protocol);
    }

    pub fn protocols(&self) -> &[Arc<dyn Protocol>] {
        &self.protocols
    }

    /// Subscribes to the store's updates and spawns the event loop.
    ///
    /// The subscription exists when this returns, so batches published
    /// afterwards are seen by the loop.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut subscription = self
            .store
            .updates()
            .subscribe(self.config.subscription_capacity);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            info!(
                "Manager started ({} protocols, cleanup every {:?}, heartbeat {})",
                manager.protocols.len(),
                manager.config.agent_cleanup_interval,
                if manager.config.heartbeat_enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );

            let cleanup_every = manager.config.agent_cleanup_interval.max(MIN_TICK);
            let mut cleanup = interval_at(Instant::now() + cleanup_every, cleanup_every);
            cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let heartbeat_every = manager.config.heartbeat_interval.max(MIN_TICK);
            let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let heartbeat_enabled = manager.config.heartbeat_enabled;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    received = subscription.recv() => match received {
                        Some(updates) => manager.handle_updates(updates).await,
                        None => {
                            warn!("Update source closed, stopping manager");
                            break;
                        }
                    },
                    _ = cleanup.tick() => {
                        manager.cleanup_disconnected_agents().await;
                    }
                    _ = heartbeat.tick(), if heartbeat_enabled => {
                        manager.send_heartbeats().await;
                    }
                }
            }

            info!("Manager stopped");
        })
    }

    /// Processes one batch: cascade, collect, dispatch.
    pub async fn handle_updates(&self, mut updates: Updates) {
        if updates.is_empty() {
            return;
        }
        metrics::BATCHES_PROCESSED_TOTAL.inc();

        updates.add_transitive_updates(self.store.as_ref()).await;

        let pending = self.collect_agent_updates(&updates).await;
        metrics::PENDING_AGENT_UPDATES.observe(pending.len() as f64);
        debug!(
            batch_size = updates.size(),
            pending = pending.len(),
            "handling update batch"
        );

        self.dispatch(pending).await;
    }

    /// Computes the updates of every connected agent affected by the batch.
    ///
    /// Agents being removed are disconnected. Agents that are not connected
    /// are skipped. Only non-empty updates are returned.
    pub async fn collect_agent_updates(&self, updates: &Updates) -> PendingUpdates {
        let mut pending = PendingUpdates::new();

        for key in updates.agents.keys_sorted() {
            let Some(event) = updates.agents.get(key) else {
                continue;
            };
            let agent = &event.item;

            if event.kind == EventKind::Remove {
                self.disconnect(&agent.id);
                continue;
            }
            if !self.connected(&agent.id) {
                continue;
            }

            let entry = pending
                .entry(agent.id.clone())
                .or_insert_with(|| (agent.clone(), AgentUpdates::default()));

            if event.kind == EventKind::Label {
                entry.1.labels = Some(agent.custom_labels());
                if let Some(version) = agent.pending_upgrade_version() {
                    entry.1.version = Some(version.to_string());
                }
                match self.store.agent_configuration(agent).await {
                    Ok(Some(configuration)) => entry.1.configuration = Some(configuration),
                    Ok(None) => {}
                    Err(e) => error!(agent_id = %agent.id, "Failed to find configuration: {}", e),
                }
            } else if let Some(version) = agent.pending_upgrade_version() {
                entry.1.version = Some(version.to_string());
            }
        }

        for key in updates.configurations.keys_sorted() {
            let Some(event) = updates.configurations.get(key) else {
                continue;
            };
            let configuration = &event.item;

            if event.kind == EventKind::Remove {
                // TODO: resolve each matching agent's fallback configuration once
                // the store can answer it for a removed configuration.
                debug!(configuration = %configuration.name, "configuration removed, agents keep their current pipeline");
                continue;
            }

            let agent_ids = match self
                .store
                .agents_ids_matching_configuration(configuration)
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    error!(configuration = %configuration.name, "Failed to find matching agents: {}", e);
                    continue;
                }
            };

            for agent_id in agent_ids {
                if !self.connected(&agent_id) {
                    continue;
                }
                if let Some((_, agent_updates)) = pending.get_mut(&agent_id) {
                    agent_updates.configuration = Some(configuration.clone());
                    continue;
                }
                match self.store.agent(&agent_id).await {
                    Ok(Some(agent)) => {
                        let agent_updates = AgentUpdates {
                            configuration: Some(configuration.clone()),
                            ..Default::default()
                        };
                        pending.insert(agent_id, (agent, agent_updates));
                    }
                    Ok(None) => debug!(agent_id = %agent_id, "matching agent no longer exists"),
                    Err(e) => error!(agent_id = %agent_id, "Failed to load agent: {}", e),
                }
            }
        }

        pending.retain(|_, (_, agent_updates)| !agent_updates.is_empty());
        pending
    }

    async fn dispatch(&self, pending: PendingUpdates) {
        if pending.is_empty() {
            return;
        }

        let protocols = Arc::new(self.protocols.clone());
        let items: Vec<(Agent, AgentUpdates)> = pending.into_values().collect();
        let timer = metrics::DISPATCH_DURATION_SECONDS.start_timer();

        self.pool
            .run(items, move |(agent, agent_updates)| {
                let protocols = Arc::clone(&protocols);
                async move {
                    for protocol in protocols.iter() {
                        if let Err(e) = protocol.update_agent(&agent, &agent_updates).await {
                            metrics::PROTOCOL_FAILURES_TOTAL
                                .with_label_values(&[protocol.name(), "update_agent"])
                                .inc();
                            error!(
                                agent_id = %agent.id,
                                protocol = protocol.name(),
                                "Failed to update agent: {}", e
                            );
                        }
                    }
                }
            })
            .await;

        timer.observe_duration();
    }

    pub async fn agent(&self, id: &str) -> Result<Option<Agent>, ManagerError> {
        Ok(self.store.agent(id).await?)
    }

    pub async fn upsert_agent(&self, id: &str, updater: AgentUpdater) -> Result<Agent, ManagerError> {
        Ok(self.store.upsert_agent(id, updater).await?)
    }

    /// Everything an agent should currently have, read from the store.
    ///
    /// Used when an agent connects; unrelated to in-flight batches.
    pub async fn agent_updates(&self, agent: &Agent) -> Result<AgentUpdates, ManagerError> {
        let configuration = self.store.agent_configuration(agent).await?;
        Ok(AgentUpdates {
            labels: Some(agent.custom_labels()),
            configuration,
            version: agent.pending_upgrade_version().map(str::to_string),
        })
    }

    /// True when no secret key is configured or `key` equals it.
    pub fn verify_secret_key(&self, key: &str) -> bool {
        match &self.config.secret_key {
            None => true,
            Some(secret) => secret == key,
        }
    }

    /// Asks the protocols the agent is connected through for a report.
    ///
    /// Protocol failures are logged, not returned.
    pub async fn request_report(&self, agent_id: &str, report: &Report) -> Result<(), ManagerError> {
        let mut requested = false;
        for protocol in self.protocols.iter().filter(|p| p.connected(agent_id)) {
            requested = true;
            if let Err(e) = protocol.request_report(agent_id, report).await {
                metrics::PROTOCOL_FAILURES_TOTAL
                    .with_label_values(&[protocol.name(), "request_report"])
                    .inc();
                error!(agent_id, protocol = protocol.name(), "Failed to request report: {}", e);
            }
        }
        if requested {
            Ok(())
        } else {
            Err(ManagerError::NotConnected(agent_id.to_string()))
        }
    }

    pub async fn agent_version(&self, name: &str) -> Result<AgentVersion, ManagerError> {
        Ok(self.versions.version(name).await?)
    }

    pub async fn latest_agent_version(&self) -> Result<AgentVersion, ManagerError> {
        Ok(self.versions.latest_version().await?)
    }

    /// Disconnects the agent from the first protocol holding it.
    pub fn disconnect(&self, agent_id: &str) -> bool {
        for protocol in &self.protocols {
            if protocol.disconnect(agent_id) {
                info!(agent_id, protocol = protocol.name(), "Agent disconnected");
                return true;
            }
        }
        false
    }

    /// True if any protocol holds a connection to the agent.
    pub fn connected(&self, agent_id: &str) -> bool {
        self.protocols.iter().any(|p| p.connected(agent_id))
    }

    /// Sends a heartbeat to every agent connected through any protocol.
    pub async fn send_heartbeats(&self) {
        let mut connected = HashSet::new();
        for protocol in &self.protocols {
            let agent_ids = match protocol.connected_agent_ids().await {
                Ok(ids) => ids,
                Err(e) => {
                    error!(protocol = protocol.name(), "Failed to list connected agents: {}", e);
                    continue;
                }
            };
            for agent_id in agent_ids {
                if let Err(e) = protocol.send_heartbeat(&agent_id).await {
                    metrics::PROTOCOL_FAILURES_TOTAL
                        .with_label_values(&[protocol.name(), "send_heartbeat"])
                        .inc();
                    warn!(agent_id = %agent_id, protocol = protocol.name(), "Failed to send heartbeat: {}", e);
                }
                connected.insert(agent_id);
            }
        }
        metrics::CONNECTED_AGENTS.set(connected.len() as i64);
    }

    /// Removes agents disconnected for longer than the configured TTL.
    ///
    /// # Returns
    /// The number of agents removed; failures are logged and count as zero.
    #[tracing::instrument(skip(self), fields(otel.status_code = tracing::field::Empty))]
    pub async fn cleanup_disconnected_agents(&self) -> usize {
        let ttl = match chrono::Duration::from_std(self.config.agent_cleanup_ttl) {
            Ok(ttl) => ttl,
            Err(e) => {
                tracing::Span::current().record("otel.status_code", "ERROR");
                error!("Invalid agent cleanup TTL: {}", e);
                return 0;
            }
        };
        let now = self.clock.now();
        let since = now
            .checked_sub_signed(ttl)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        match self.store.cleanup_disconnected_agents(since).await {
            Ok(removed) => {
                if !removed.is_empty() {
                    info!("Removed {} agents disconnected since before {}", removed.len(), since);
                }
                metrics::AGENTS_CLEANED_UP_TOTAL.inc_by(removed.len() as u64);
                removed.len()
            }
            Err(e) => {
                tracing::Span::current().record("otel.status_code", "ERROR");
                error!("Failed to clean up disconnected agents: {}", e);
                0
            }
        }
    }

    /// Shuts down every protocol, logging failures.
    pub async fn shutdown(&self) {
        for protocol in &self.protocols {
            if let Err(e) = protocol.shutdown().await {
                error!(protocol = protocol.name(), "Failed to shut down protocol: {}", e);
            }
        }
        info!("Manager shut down");
    }
}
