/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::bus::BusConfig;
use crate::health;
use crate::manager::{Manager, ManagerConfig};
use crate::metrics;
use crate::store::MemoryStore;
use crate::versions::StaticVersions;
use std::path::PathBuf;
use std::sync::Arc;
use tether_utils::logging::prelude::*;
use tether_utils::Settings;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Function to start the Tether manager
///
/// Starts the store and its update relay, the manager loop and the health
/// endpoint, then runs until Ctrl+C. No transport is registered here;
/// embedding applications add theirs with [`Manager::enable_protocol`].
pub async fn serve(
    settings: &Settings,
    seed: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Tether manager");
    metrics::init();

    let cancel = CancellationToken::new();

    let store = Arc::new(MemoryStore::new(BusConfig::from(&settings.bus)));
    let versions = Arc::new(StaticVersions::from(&settings.versions));
    let manager = Arc::new(Manager::new(
        ManagerConfig::from(settings),
        store.clone(),
        versions,
    ));
    let manager_task = manager.start(cancel.child_token());

    if let Some(seed) = seed {
        let updates = store.load_resources_yaml(&seed).await?;
        info!("Seeded store with {} resources from {}", updates.size(), seed.display());
    }

    let health_task = settings.server.health_port.map(|port| {
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = health::serve(port, cancel).await {
                error!("Health endpoint failed: {}", e);
            }
        })
    });

    info!("Tether manager is now running");
    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    cancel.cancel();
    store.shutdown();
    manager_task.await?;
    if let Some(task) = health_task {
        task.await?;
    }
    manager.shutdown().await;
    tether_utils::telemetry::shutdown();

    Ok(())
}

/// Function to print the resolved configuration
///
/// The secret key is never printed.
pub fn check_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let manager = &settings.manager;
    println!("log.level = {}", settings.log.level);
    println!("log.format = {}", settings.log.format);
    println!(
        "manager.secret_key = {}",
        if manager.secret_key.is_some() { "<set>" } else { "<unset>" }
    );
    println!(
        "manager.agent_cleanup_interval_seconds = {}",
        manager.agent_cleanup_interval_seconds
    );
    println!(
        "manager.agent_cleanup_ttl_seconds = {}",
        manager.agent_cleanup_ttl_seconds
    );
    println!(
        "manager.heartbeat_interval_seconds = {}",
        manager.heartbeat_interval_seconds
    );
    println!("manager.heartbeat_enabled = {}", manager.heartbeat_enabled);
    println!("manager.max_dispatch_workers = {}", manager.max_dispatch_workers);
    println!("manager.subscription_capacity = {}", manager.subscription_capacity);
    println!("bus.channel_size = {}", settings.bus.channel_size);
    println!("bus.debounce_ms = {}", settings.bus.debounce_ms);
    println!("bus.max_events = {}", settings.bus.max_events);
    match settings.server.health_port {
        Some(port) => println!("server.health_port = {}", port),
        None => println!("server.health_port = <disabled>"),
    }
    println!("versions.available = {:?}", settings.versions.available);

    let telemetry = settings.telemetry.for_manager();
    println!("telemetry.enabled = {}", telemetry.enabled);
    println!("telemetry.otlp_endpoint = {}", telemetry.otlp_endpoint);
    println!("telemetry.service_name = {}", telemetry.service_name);
    println!("telemetry.sampling_rate = {}", telemetry.sampling_rate);

    Ok(())
}
