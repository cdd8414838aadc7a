/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::{RecordingProtocol, TestFixture};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tether_manager::clock::ManualClock;
use tether_manager::manager::{AgentUpdates, ManagerConfig, ManagerError};
use tether_manager::protocol::{Protocol, Report};
use tether_manager::store::{EventKind, Store, Updates};
use tether_models::models::{
    AgentUpgrade, AnyResource, Configuration, Labels, UpgradeStatus,
};

fn configuration_update(configuration: Configuration) -> Updates {
    let mut updates = Updates::new();
    updates
        .configurations
        .include(configuration, EventKind::Update);
    updates
}

#[tokio::test]
async fn test_disconnected_agent_gets_no_update() {
    let fixture = TestFixture::new();
    fixture.agent("A", "configuration=test", false).await;
    let configuration = Configuration::new("test");
    fixture
        .apply(vec![AnyResource::Configuration(configuration.clone())])
        .await;

    let pending = fixture
        .manager
        .collect_agent_updates(&configuration_update(configuration.clone()))
        .await;
    assert!(pending.is_empty());

    fixture
        .manager
        .handle_updates(configuration_update(configuration))
        .await;
    assert!(fixture.protocol.updates().is_empty());
}

#[tokio::test]
async fn test_connected_agent_receives_configuration() {
    let fixture = TestFixture::new();
    fixture.agent("A", "configuration=test", true).await;
    fixture.agent("B", "configuration=other", true).await;
    let configuration = Configuration::new("test");

    fixture
        .manager
        .handle_updates(configuration_update(configuration.clone()))
        .await;

    let updates = fixture.protocol.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "A");
    assert_eq!(
        updates[0].1,
        AgentUpdates {
            configuration: Some(configuration),
            ..Default::default()
        }
    );
}

#[tokio::test]
async fn test_label_change_sends_custom_labels_and_configuration() {
    let fixture = TestFixture::new();
    fixture
        .apply(vec![AnyResource::Configuration(Configuration::new("test"))])
        .await;
    fixture.agent("A", "", true).await;

    let agent = fixture
        .store
        .update_agent_labels("A", &Labels::parse("w=x,y=z,configuration=test").unwrap())
        .await
        .unwrap();
    let mut updates = Updates::new();
    updates.agents.include(agent, EventKind::Label);

    fixture.manager.handle_updates(updates).await;

    let sent = fixture.protocol.updates_for("A");
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].labels,
        Some(Labels::parse("w=x,y=z,configuration=test").unwrap())
    );
    assert_eq!(sent[0].configuration.as_ref().unwrap().name, "test");
    assert!(sent[0].version.is_none());
}

#[tokio::test]
async fn test_label_change_labels_are_exactly_the_custom_labels() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;

    let agent = fixture
        .store
        .update_agent_labels("A", &Labels::parse("w=x,y=z").unwrap())
        .await
        .unwrap();
    let mut updates = Updates::new();
    updates.agents.include(agent, EventKind::Label);

    let pending = fixture.manager.collect_agent_updates(&updates).await;
    let (_, agent_updates) = pending.get("A").unwrap();
    assert_eq!(agent_updates.labels, Some(Labels::parse("w=x,y=z").unwrap()));
    assert!(agent_updates.configuration.is_none());
}

#[tokio::test]
async fn test_label_change_carries_pending_upgrade() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;
    let agent = fixture
        .store
        .upsert_agent(
            "A",
            Box::new(|a| {
                a.upgrade = Some(AgentUpgrade {
                    version: "1.1.0".to_string(),
                    status: UpgradeStatus::Pending,
                    error: None,
                })
            }),
        )
        .await
        .unwrap();

    let mut updates = Updates::new();
    updates.agents.include(agent, EventKind::Label);
    let pending = fixture.manager.collect_agent_updates(&updates).await;

    assert_eq!(pending["A"].1.version.as_deref(), Some("1.1.0"));
}

#[tokio::test]
async fn test_other_agent_event_sends_only_pending_version() {
    let fixture = TestFixture::new();
    fixture.agent("A", "env=prod", true).await;
    fixture.agent("B", "env=prod", true).await;
    let upgrading = fixture
        .store
        .upsert_agent(
            "A",
            Box::new(|a| {
                a.upgrade = Some(AgentUpgrade {
                    version: "1.1.0".to_string(),
                    status: UpgradeStatus::Pending,
                    error: None,
                })
            }),
        )
        .await
        .unwrap();
    let idle = fixture.store.agent("B").await.unwrap().unwrap();

    let mut updates = Updates::new();
    updates.agents.include(upgrading, EventKind::Update);
    updates.agents.include(idle, EventKind::Update);
    fixture.manager.handle_updates(updates).await;

    let sent = fixture.protocol.updates();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0],
        (
            "A".to_string(),
            AgentUpdates {
                version: Some("1.1.0".to_string()),
                ..Default::default()
            }
        )
    );
}

#[tokio::test]
async fn test_removed_agent_is_disconnected() {
    let fixture = TestFixture::new();
    let agent = fixture.agent("A", "", true).await;
    assert!(fixture.manager.connected("A"));

    let mut updates = Updates::new();
    updates.agents.include(agent, EventKind::Remove);
    fixture.manager.handle_updates(updates).await;

    assert!(!fixture.manager.connected("A"));
    assert!(fixture.protocol.updates().is_empty());
}

#[tokio::test]
async fn test_single_dispatch_per_agent_per_batch() {
    let fixture = TestFixture::new();
    fixture
        .apply(vec![
            AnyResource::Configuration(Configuration::new("test")),
            AnyResource::Configuration(
                Configuration::new("everyone").with_selector(Default::default()),
            ),
        ])
        .await;
    let agent = fixture.agent("A", "configuration=test", true).await;

    let mut updates = Updates::new();
    updates.agents.include(agent, EventKind::Label);
    updates
        .configurations
        .include(Configuration::new("test"), EventKind::Update);
    updates.configurations.include(
        Configuration::new("everyone").with_selector(Default::default()),
        EventKind::Update,
    );

    fixture.manager.handle_updates(updates).await;

    let sent = fixture.protocol.updates_for("A");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].labels.is_some());
    assert!(sent[0].configuration.is_some());
}

#[tokio::test]
async fn test_removed_configuration_attaches_nothing() {
    let fixture = TestFixture::new();
    fixture.agent("A", "configuration=test", true).await;

    let mut updates = Updates::new();
    updates
        .configurations
        .include(Configuration::new("test"), EventKind::Remove);

    let pending = fixture.manager.collect_agent_updates(&updates).await;
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_every_protocol_receives_every_update() {
    let second = RecordingProtocol::new("second");
    let second_for_build = second.clone();
    let fixture = TestFixture::build(ManagerConfig::default(), move |mut manager| {
        manager.enable_protocol(second_for_build);
        manager
    });
    fixture.agent("A", "configuration=test", true).await;

    fixture
        .manager
        .handle_updates(configuration_update(Configuration::new("test")))
        .await;

    assert_eq!(fixture.protocol.updates_for("A").len(), 1);
    assert!(!second.connected("A"));
    assert_eq!(second.updates_for("A").len(), 1);
}

#[tokio::test]
async fn test_protocol_failure_does_not_stop_dispatch() {
    let fixture = TestFixture::new();
    for id in ["A", "B", "C", "D", "E", "F"] {
        fixture.agent(id, "configuration=test", true).await;
    }
    fixture.protocol.fail_updates_for("C");

    fixture
        .manager
        .handle_updates(configuration_update(Configuration::new("test")))
        .await;

    let ids: Vec<String> = fixture
        .protocol
        .updates()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["A", "B", "C", "D", "E", "F"]);
}

#[tokio::test]
async fn test_protocol_panic_does_not_drop_other_agents() {
    let fixture = TestFixture::new();
    for id in ["A", "B", "C"] {
        fixture.agent(id, "configuration=test", true).await;
    }
    fixture.protocol.panic_updates_for("A");

    fixture
        .manager
        .handle_updates(configuration_update(Configuration::new("test")))
        .await;

    let ids: Vec<String> = fixture
        .protocol
        .updates()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids, vec!["B", "C"]);
}

#[tokio::test]
async fn test_empty_batch_is_skipped() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;

    fixture.manager.handle_updates(Updates::new()).await;

    assert!(fixture.protocol.updates().is_empty());
}

#[tokio::test]
async fn test_agent_updates_reflect_current_store_state() {
    let fixture = TestFixture::new();
    fixture
        .apply(vec![AnyResource::Configuration(Configuration::new("test"))])
        .await;
    let agent = fixture.agent("A", "configuration=test,env=prod", false).await;

    let agent_updates = fixture.manager.agent_updates(&agent).await.unwrap();

    assert_eq!(
        agent_updates.labels,
        Some(Labels::parse("configuration=test,env=prod").unwrap())
    );
    assert_eq!(agent_updates.configuration.unwrap().name, "test");
    assert!(agent_updates.version.is_none());
}

#[tokio::test]
async fn test_agent_and_upsert_pass_through() {
    let fixture = TestFixture::new();
    assert!(fixture.manager.agent("A").await.unwrap().is_none());

    let agent = fixture
        .manager
        .upsert_agent("A", Box::new(|a| a.set_version("1.0.0")))
        .await
        .unwrap();
    assert_eq!(agent.version, "1.0.0");
    assert_eq!(fixture.manager.agent("A").await.unwrap(), Some(agent));
}

#[tokio::test]
async fn test_verify_secret_key() {
    let open = TestFixture::new();
    assert!(open.manager.verify_secret_key("anything"));

    let locked = TestFixture::with_config(ManagerConfig {
        secret_key: Some("s3cret".to_string()),
        ..Default::default()
    });
    assert!(locked.manager.verify_secret_key("s3cret"));
    assert!(!locked.manager.verify_secret_key("S3CRET"));
    assert!(!locked.manager.verify_secret_key(""));
}

#[tokio::test]
async fn test_request_report() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;
    let report = Report {
        snapshot: true,
        pipeline: Some("logs".to_string()),
    };

    fixture.manager.request_report("A", &report).await.unwrap();
    assert_eq!(fixture.protocol.reports(), vec![("A".to_string(), report.clone())]);

    let missing = fixture.manager.request_report("B", &report).await;
    assert!(matches!(missing, Err(ManagerError::NotConnected(_))));
}

#[tokio::test]
async fn test_agent_version() {
    let fixture = TestFixture::new();
    assert_eq!(
        fixture.manager.agent_version("1.0.0").await.unwrap().version,
        "1.0.0"
    );
    assert_eq!(
        fixture.manager.latest_agent_version().await.unwrap().version,
        "1.1.0"
    );
    assert!(matches!(
        fixture.manager.agent_version("9.9.9").await,
        Err(ManagerError::Versions(_))
    ));
}

#[tokio::test]
async fn test_disconnect() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;

    assert!(fixture.manager.disconnect("A"));
    assert!(!fixture.manager.disconnect("A"));
    assert!(!fixture.manager.connected("A"));
}

#[tokio::test]
async fn test_send_heartbeats_to_connected_agents() {
    let fixture = TestFixture::new();
    fixture.agent("A", "", true).await;
    fixture.agent("B", "", true).await;
    fixture.agent("C", "", false).await;

    fixture.manager.send_heartbeats().await;

    assert_eq!(fixture.protocol.heartbeats(), vec!["A", "B"]);
}

#[tokio::test]
async fn test_cleanup_uses_injected_clock() {
    let now = Utc::now();
    let clock = Arc::new(ManualClock::new(now));
    let manager_clock = clock.clone();
    let fixture = TestFixture::build(ManagerConfig::default(), move |manager| {
        manager.with_clock(manager_clock)
    });
    fixture
        .store
        .upsert_agent(
            "A",
            Box::new(move |a| a.mark_disconnected(now - Duration::minutes(10))),
        )
        .await
        .unwrap();

    assert_eq!(fixture.manager.cleanup_disconnected_agents().await, 0);

    clock.advance(Duration::minutes(6));
    assert_eq!(fixture.manager.cleanup_disconnected_agents().await, 1);
    assert!(fixture.manager.agent("A").await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_reaches_every_protocol() {
    let second = RecordingProtocol::new("second");
    second.fail_shutdown();
    let second_for_build = second.clone();
    let fixture = TestFixture::build(ManagerConfig::default(), move |mut manager| {
        manager.enable_protocol(second_for_build);
        manager
    });

    fixture.manager.shutdown().await;

    assert_eq!(fixture.protocol.shutdowns(), 1);
    assert_eq!(second.shutdowns(), 1);
}
