/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Merge relay between store writes and update subscribers.
//!
//! Every store write hands its [`Updates`] to an [`UpdatesSender`]. The relay
//! task merges incoming batches into one accumulating batch and publishes it to
//! the external [`EventSource`] when:
//!
//! 1. an incoming batch cannot be merged (the accumulated batch is published and
//!    the incoming one starts a new batch),
//! 2. the accumulated batch reaches `max_events`,
//! 3. the debounce window opened by the first batch of the accumulation expires,
//! 4. the relay is cancelled or every sender is dropped.

use super::EventSource;
use crate::metrics;
use crate::store::updates::{merge_updates, Updates};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default ingestion channel buffer size.
const DEFAULT_CHANNEL_SIZE: usize = 1000;
/// Default debounce window.
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
/// Default maximum number of events in one published batch.
const DEFAULT_MAX_EVENTS: usize = 10_000;

/// Configuration of the update relay.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Buffer size of the ingestion channel.
    pub channel_size: usize,
    /// Window in which adjacent batches are merged.
    pub debounce: Duration,
    /// Accumulated batch size that forces a flush.
    pub max_events: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_size: DEFAULT_CHANNEL_SIZE,
            debounce: DEFAULT_DEBOUNCE,
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

impl From<&tether_utils::config::Bus> for BusConfig {
    fn from(bus: &tether_utils::config::Bus) -> Self {
        Self {
            channel_size: bus.channel_size,
            debounce: bus.debounce(),
            max_events: bus.max_events,
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("update relay is not running")]
    Closed,
}

/// Feeds store writes into the relay.
#[derive(Clone)]
pub struct UpdatesSender {
    sender: mpsc::Sender<Updates>,
}

impl UpdatesSender {
    /// Hands a batch to the relay, waiting while the ingestion channel is full.
    pub async fn send(&self, updates: Updates) -> Result<(), BusError> {
        self.reserve().await?.send(updates);
        Ok(())
    }

    /// Reserves a slot in the ingestion channel, waiting while it is full.
    ///
    /// Store writers reserve before taking their state lock and send through
    /// the permit while still holding it, so batches reach the relay in commit
    /// order.
    pub async fn reserve(&self) -> Result<UpdatesPermit<'_>, BusError> {
        let permit = self.sender.reserve().await.map_err(|_| BusError::Closed)?;
        Ok(UpdatesPermit { permit })
    }
}

/// A reserved slot in the relay's ingestion channel.
pub struct UpdatesPermit<'a> {
    permit: mpsc::Permit<'a, Updates>,
}

impl UpdatesPermit<'_> {
    /// Hands a batch to the relay without waiting. An empty batch only
    /// releases the slot.
    pub fn send(self, updates: Updates) {
        if !updates.is_empty() {
            self.permit.send(updates);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Conflict,
    MaxEvents,
    Debounce,
    Shutdown,
}

impl FlushReason {
    fn as_str(self) -> &'static str {
        match self {
            FlushReason::Conflict => "conflict",
            FlushReason::MaxEvents => "max_events",
            FlushReason::Debounce => "debounce",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// The relay task.
pub struct UpdatesRelay {
    receiver: mpsc::Receiver<Updates>,
    target: EventSource<Updates>,
    config: BusConfig,
    accumulated: Option<Updates>,
    deadline: Option<Instant>,
}

impl UpdatesRelay {
    /// Starts a relay publishing to `target` until `cancel` fires or every
    /// sender is dropped.
    ///
    /// # Returns
    /// The sender feeding the relay and the handle of its task.
    pub fn spawn(
        config: BusConfig,
        target: EventSource<Updates>,
        cancel: CancellationToken,
    ) -> (UpdatesSender, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.channel_size.max(1));
        info!(
            "Update relay started (channel_size: {}, debounce: {:?}, max_events: {})",
            config.channel_size, config.debounce, config.max_events
        );
        let relay = UpdatesRelay {
            receiver,
            target,
            config,
            accumulated: None,
            deadline: None,
        };
        let handle = tokio::spawn(relay.run(cancel));
        (UpdatesSender { sender }, handle)
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.flush(FlushReason::Shutdown).await;
                    break;
                }
                _ = wait_until(deadline) => {
                    self.flush(FlushReason::Debounce).await;
                }
                received = self.receiver.recv() => match received {
                    Some(updates) => self.accept(updates).await,
                    None => {
                        self.flush(FlushReason::Shutdown).await;
                        break;
                    }
                },
            }
        }
        info!("Update relay stopped");
    }

    async fn accept(&mut self, updates: Updates) {
        if updates.is_empty() {
            return;
        }

        match self.accumulated.as_mut() {
            None => self.start(updates),
            Some(accumulated) => {
                if merge_updates(accumulated, &updates) {
                    metrics::RELAY_MERGES_TOTAL.inc();
                    debug!(size = accumulated.size(), "merged update batch");
                } else {
                    debug!("update batch conflicts with accumulated batch");
                    self.flush(FlushReason::Conflict).await;
                    self.start(updates);
                }
            }
        }

        let full = self
            .accumulated
            .as_ref()
            .map(|u| u.size() >= self.config.max_events)
            .unwrap_or(false);
        if full {
            self.flush(FlushReason::MaxEvents).await;
        }
    }

    fn start(&mut self, updates: Updates) {
        self.accumulated = Some(updates);
        self.deadline = Some(Instant::now() + self.config.debounce);
    }

    async fn flush(&mut self, reason: FlushReason) {
        self.deadline = None;
        let Some(updates) = self.accumulated.take() else {
            return;
        };
        metrics::RELAY_FLUSHES_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
        debug!(size = updates.size(), reason = reason.as_str(), "publishing update batch");
        if self.target.send(updates).await == 0 {
            warn!("update batch published without subscribers");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
