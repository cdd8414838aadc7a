/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! In-process update bus.
//!
//! [`EventSource`] fans a value out to every subscriber over bounded tokio mpsc
//! channels. Sending waits for room in each subscriber's channel, so a slow
//! subscriber slows the sender down instead of losing values. Subscribers whose
//! receiving side is gone are pruned on the next send.
//!
//! The [`relay`] module sits between the store and the external source and
//! coalesces bursts of update batches.

pub mod relay;

pub use relay::{BusConfig, BusError, UpdatesPermit, UpdatesRelay, UpdatesSender};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tracing::debug;

/// Predicate deciding whether a subscriber receives a value.
pub type Filter<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Subscriber<T> {
    sender: mpsc::Sender<T>,
    filter: Option<Filter<T>>,
}

struct Subscribers<T> {
    next_id: u64,
    entries: HashMap<u64, Subscriber<T>>,
}

type Shared<T> = Arc<Mutex<Subscribers<T>>>;

fn lock<T>(subscribers: &Mutex<Subscribers<T>>) -> MutexGuard<'_, Subscribers<T>> {
    // A panic while holding the lock cannot leave the map half-updated.
    subscribers.lock().unwrap_or_else(|e| e.into_inner())
}

/// A multi-subscriber source of values.
///
/// Cloning yields another handle to the same set of subscribers.
pub struct EventSource<T> {
    subscribers: Shared<T>,
}

impl<T> Clone for EventSource<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventSource<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: HashMap::new(),
            })),
        }
    }

    /// Subscribes with a channel buffering up to `capacity` values.
    pub fn subscribe(&self, capacity: usize) -> Subscription<T> {
        self.add_subscriber(capacity, None)
    }

    /// Subscribes to the values for which `filter` returns true.
    pub fn subscribe_with_filter<F>(&self, capacity: usize, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.add_subscriber(capacity, Some(Box::new(filter)))
    }

    fn add_subscriber(&self, capacity: usize, filter: Option<Filter<T>>) -> Subscription<T> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let mut subscribers = lock(&self.subscribers);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.insert(id, Subscriber { sender, filter });
        debug!(subscriber = id, capacity, "subscriber added");

        Subscription {
            id,
            receiver,
            source: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).entries.len()
    }

    /// Delivers `item` to every matching subscriber.
    ///
    /// Waits while a subscriber's channel is full. Returns the number of
    /// subscribers the value was delivered to.
    pub async fn send(&self, item: T) -> usize {
        let targets: Vec<(u64, mpsc::Sender<T>)> = {
            let subscribers = lock(&self.subscribers);
            subscribers
                .entries
                .iter()
                .filter(|(_, s)| s.filter.as_ref().map(|f| f(&item)).unwrap_or(true))
                .map(|(id, s)| (*id, s.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, sender) in targets {
            match sender.send(item.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut subscribers = lock(&self.subscribers);
            for id in closed {
                subscribers.entries.remove(&id);
                debug!(subscriber = id, "pruned closed subscriber");
            }
        }

        delivered
    }
}

/// The receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription<T> {
    id: u64,
    receiver: mpsc::Receiver<T>,
    source: Weak<Mutex<Subscribers<T>>>,
}

impl<T> Subscription<T> {
    /// Receives the next value, or `None` once the source is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(source) = self.source.upgrade() {
            lock(&source).entries.remove(&self.id);
        }
    }
}
