/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

use crate::fixtures::TestFixture;
use async_trait::async_trait;
use tether_manager::store::{EventKind, ResourceLister, StoreError, Updates};
use tether_models::models::{
    AnyResource, Configuration, Destination, DestinationType, Processor, ProcessorType,
    ResourceConfiguration, Source, SourceType,
};

/// Seeds the store with a three-tier pipeline:
/// `hostmetrics -> host -> linux` and `otlp -> collector -> linux`, with the
/// `host` source running the `batch` processor.
async fn pipeline(fixture: &TestFixture) {
    fixture
        .apply(vec![
            AnyResource::SourceType(SourceType::new("hostmetrics")),
            AnyResource::ProcessorType(ProcessorType::new("batching")),
            AnyResource::Processor(Processor::new("batch", "batching")),
            AnyResource::Source(
                Source::new("host", "hostmetrics")
                    .with_processors(vec![ResourceConfiguration::named("batch")]),
            ),
            AnyResource::DestinationType(DestinationType::new("otlp")),
            AnyResource::Destination(Destination::new("collector", "otlp")),
            AnyResource::Configuration(
                Configuration::new("linux")
                    .with_sources(vec![ResourceConfiguration::named("host")])
                    .with_destinations(vec![ResourceConfiguration::named("collector")]),
            ),
            AnyResource::Configuration(
                Configuration::new("windows")
                    .with_sources(vec![ResourceConfiguration::of_type("windowsperf")]),
            ),
        ])
        .await;
}

#[tokio::test]
async fn test_source_type_update_reaches_configuration() {
    let fixture = TestFixture::new();
    pipeline(&fixture).await;

    let mut updates = Updates::new();
    updates
        .source_types
        .include(SourceType::new("hostmetrics"), EventKind::Update);
    updates.add_transitive_updates(fixture.store.as_ref()).await;

    assert!(updates.sources.contains("host", EventKind::Update));
    assert!(updates.configurations.contains("linux", EventKind::Update));
    assert!(!updates.configurations.contains_key("windows"));
    assert!(updates.destinations.is_empty());
}

#[tokio::test]
async fn test_processor_type_update_walks_every_tier() {
    let fixture = TestFixture::new();
    pipeline(&fixture).await;

    let mut updates = Updates::new();
    updates
        .processor_types
        .include(ProcessorType::new("batching"), EventKind::Update);
    updates.add_transitive_updates(fixture.store.as_ref()).await;

    assert!(updates.processors.contains("batch", EventKind::Update));
    assert!(updates.sources.contains("host", EventKind::Update));
    assert!(updates.configurations.contains("linux", EventKind::Update));
}

#[tokio::test]
async fn test_destination_type_update_reaches_configuration() {
    let fixture = TestFixture::new();
    pipeline(&fixture).await;

    let mut updates = Updates::new();
    updates
        .destination_types
        .include(DestinationType::new("otlp"), EventKind::Update);
    updates.add_transitive_updates(fixture.store.as_ref()).await;

    assert!(updates.destinations.contains("collector", EventKind::Update));
    assert!(updates.configurations.contains("linux", EventKind::Update));
    assert!(updates.sources.is_empty());
}

#[tokio::test]
async fn test_inserted_type_does_not_cascade() {
    let fixture = TestFixture::new();
    pipeline(&fixture).await;

    let mut updates = Updates::new();
    updates
        .source_types
        .include(SourceType::new("hostmetrics"), EventKind::Insert);
    updates.add_transitive_updates(fixture.store.as_ref()).await;

    assert!(updates.sources.is_empty());
    // The configuration check looks at keys of any kind, but only for
    // resources the configuration names directly.
    assert!(!updates.configurations.contains_key("linux"));
}

#[tokio::test]
async fn test_configuration_update_does_not_cascade() {
    let fixture = TestFixture::new();
    pipeline(&fixture).await;

    let mut updates = Updates::new();
    updates.configurations.include(
        Configuration::new("linux").with_sources(vec![ResourceConfiguration::named("host")]),
        EventKind::Update,
    );
    updates.add_transitive_updates(fixture.store.as_ref()).await;

    assert_eq!(updates.size(), 1);
}

#[tokio::test]
async fn test_cascade_delivers_configuration_to_connected_agent() {
    let fixture = TestFixture::new();
    pipeline(&fixture).await;
    fixture.agent("A", "configuration=linux", true).await;
    fixture.agent("B", "configuration=linux", false).await;
    fixture.agent("C", "configuration=windows", true).await;

    let mut updates = Updates::new();
    updates
        .source_types
        .include(SourceType::new("hostmetrics"), EventKind::Update);
    fixture.manager.handle_updates(updates).await;

    let sent = fixture.protocol.updates();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "A");
    assert_eq!(sent[0].1.configuration.as_ref().unwrap().name, "linux");
}

struct FailingLister;

#[async_trait]
impl ResourceLister for FailingLister {
    async fn sources(&self) -> Result<Vec<Source>, StoreError> {
        Err(StoreError::Unavailable("sources offline".to_string()))
    }

    async fn processors(&self) -> Result<Vec<Processor>, StoreError> {
        Ok(vec![Processor::new("batch", "batching")])
    }

    async fn destinations(&self) -> Result<Vec<Destination>, StoreError> {
        Err(StoreError::Unavailable("destinations offline".to_string()))
    }

    async fn configurations(&self) -> Result<Vec<Configuration>, StoreError> {
        Ok(vec![Configuration::new("linux")
            .with_sources(vec![ResourceConfiguration::of_type("hostmetrics")])])
    }
}

#[tokio::test]
async fn test_listing_failure_skips_only_that_tier() {
    let mut updates = Updates::new();
    updates
        .processor_types
        .include(ProcessorType::new("batching"), EventKind::Update);
    updates
        .source_types
        .include(SourceType::new("hostmetrics"), EventKind::Update);

    updates.add_transitive_updates(&FailingLister).await;

    assert!(updates.processors.contains("batch", EventKind::Update));
    assert!(updates.sources.is_empty());
    assert!(updates.configurations.contains("linux", EventKind::Update));
}
