/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::{eventually, TestFixture};
use chrono::Utc;
use std::time::Duration;
use tether_manager::manager::ManagerConfig;
use tether_manager::store::Store;
use tether_models::models::{
    AnyResource, Configuration, Labels, ResourceConfiguration, Source, SourceType,
};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_store_writes_reach_connected_agents() {
    let fixture = TestFixture::new();
    fixture.agent("A", "configuration=linux", true).await;
    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    fixture
        .apply(vec![AnyResource::Configuration(Configuration::new("linux"))])
        .await;

    eventually(|| fixture.protocol.updates_for("A").len() == 1).await;
    let sent = fixture.protocol.updates_for("A");
    assert_eq!(sent[0].configuration.as_ref().unwrap().name, "linux");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_writes_is_dispatched_once() {
    let fixture = TestFixture::new();
    fixture
        .apply(vec![
            AnyResource::SourceType(SourceType::new("hostmetrics")),
            AnyResource::Source(Source::new("host", "hostmetrics")),
            AnyResource::Configuration(
                Configuration::new("linux").with_sources(vec![ResourceConfiguration::named("host")]),
            ),
        ])
        .await;
    fixture.agent("A", "configuration=linux", true).await;
    // Let the setup writes drain before the manager subscribes.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    let mut changed = SourceType::new("hostmetrics");
    changed.spec.version = 2;
    fixture.apply(vec![AnyResource::SourceType(changed)]).await;
    let mut changed = SourceType::new("hostmetrics");
    changed.spec.version = 3;
    fixture.apply(vec![AnyResource::SourceType(changed)]).await;

    eventually(|| !fixture.protocol.updates_for("A").is_empty()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fixture.protocol.updates_for("A").len(), 1);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_label_update_reaches_agent() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    fixture
        .store
        .update_agent_labels("A", &Labels::parse("w=x,y=z").unwrap())
        .await
        .unwrap();

    eventually(|| fixture.protocol.updates_for("A").len() == 1).await;
    assert_eq!(
        fixture.protocol.updates_for("A")[0].labels,
        Some(Labels::parse("w=x,y=z").unwrap())
    );

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_ticker_evicts_disconnected_agents() {
    let fixture = TestFixture::with_config(ManagerConfig {
        agent_cleanup_interval: Duration::from_secs(60),
        agent_cleanup_ttl: Duration::ZERO,
        ..Default::default()
    });
    fixture
        .store
        .upsert_agent(
            "A",
            Box::new(|a| a.mark_disconnected(Utc::now() - chrono::Duration::seconds(1))),
        )
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(fixture.store.agent("A").await.unwrap().is_some());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(fixture.store.agent("A").await.unwrap().is_none());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_is_dormant_unless_enabled() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;
    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(fixture.protocol.heartbeats().is_empty());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_when_enabled() {
    let fixture = TestFixture::with_config(ManagerConfig {
        heartbeat_enabled: true,
        heartbeat_interval: Duration::from_secs(30),
        ..Default::default()
    });
    fixture.agent("A", "", true).await;
    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(fixture.protocol.heartbeats(), vec!["A", "A"]);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_the_loop() {
    let fixture = TestFixture::new();
    let cancel = CancellationToken::new();
    let handle = fixture.manager.start(cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("manager loop stopped")
        .unwrap();
}
