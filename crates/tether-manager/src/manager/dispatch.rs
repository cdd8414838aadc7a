/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Bounded worker pool used to dispatch agent updates.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

/// Default upper bound of concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    max_workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS)
    }
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// One worker per four items, plus one, capped at `max_workers`.
    pub fn worker_count(&self, items: usize) -> usize {
        (items / 4 + 1).min(self.max_workers)
    }

    /// Runs `handler` on every item and waits until all of them are done.
    ///
    /// Workers pull from a queue that is closed once filled, so they exit as
    /// soon as it is drained. Each item runs in its own task, so a panicking
    /// handler is logged and the worker moves on to the next item.
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, handler: F)
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if items.is_empty() {
            return;
        }

        let workers = self.worker_count(items.len());
        let (sender, receiver) = mpsc::channel(items.len());
        for item in items {
            // The channel is sized to hold every item.
            let _ = sender.try_send(item);
        }
        drop(sender);

        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            handles.push(tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some(item) = next else {
                        break;
                    };
                    if let Err(e) = tokio::spawn(handler(item)).await {
                        error!(worker, "Dispatch of one item failed: {}", e);
                    }
                }
                debug!(worker, "dispatch worker finished");
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Dispatch worker failed: {}", e);
            }
        }
    }
}
