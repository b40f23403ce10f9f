// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded FIFO between the dispatch loop and the worker pool.
//!
//! Items carry their [`InFlightGuard`], so a path is released as soon as its
//! item leaves the pipeline, whether it was processed, dropped because the
//! queue was full, or discarded because the queue closed.
//!
//! # Backpressure
//!
//! - [`BackpressurePolicy::Block`] (default): a full queue suspends the
//!   dispatch loop until a worker frees a slot. No accepted event is lost,
//!   but the watcher's own buffer keeps filling while dispatch waits.
//! - [`BackpressurePolicy::Drop`]: a full queue rejects the item and releases
//!   its path immediately. Dispatch never stalls; the file stays on disk
//!   until another event for it arrives.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::inflight::InFlightGuard;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackpressurePolicy {
    #[default]
    Block,
    Drop,
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(BackpressurePolicy::Block),
            "drop" => Ok(BackpressurePolicy::Drop),
            _ => Err("expected `block` or `drop`".to_string()),
        }
    }
}

/// A file accepted by the in-flight gate and waiting for a worker.
#[derive(Debug)]
pub struct PendingFile {
    guard: InFlightGuard,
}

impl PendingFile {
    #[must_use]
    pub fn new(guard: InFlightGuard) -> Self {
        Self { guard }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.guard.path()
    }
}

/// Result of handing a file to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queue was full under [`BackpressurePolicy::Drop`]; path released.
    Dropped,
    /// All workers are gone; path released.
    Closed,
}

/// A `capacity` of zero is raised to one.
#[must_use]
pub fn work_queue(capacity: usize, policy: BackpressurePolicy) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender { tx, policy },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Clone, Debug)]
pub struct QueueSender {
    tx: mpsc::Sender<PendingFile>,
    policy: BackpressurePolicy,
}

impl QueueSender {
    pub async fn enqueue(&self, file: PendingFile) -> Enqueued {
        match self.policy {
            BackpressurePolicy::Block => match self.tx.send(file).await {
                Ok(()) => Enqueued::Queued,
                Err(mpsc::error::SendError(file)) => {
                    debug!("QUEUE | Closed, discarding {}", file.path().display());
                    Enqueued::Closed
                }
            },
            BackpressurePolicy::Drop => match self.tx.try_send(file) {
                Ok(()) => Enqueued::Queued,
                Err(mpsc::error::TrySendError::Full(file)) => {
                    warn!("QUEUE | Full, dropping {}", file.path().display());
                    Enqueued::Dropped
                }
                Err(mpsc::error::TrySendError::Closed(file)) => {
                    debug!("QUEUE | Closed, discarding {}", file.path().display());
                    Enqueued::Closed
                }
            },
        }
    }

    #[must_use]
    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// Free slots left before the policy kicks in.
    #[must_use]
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// Shared consumer end. Clones drain the same FIFO.
#[derive(Clone, Debug)]
pub struct QueueReceiver {
    rx: Arc<Mutex<mpsc::Receiver<PendingFile>>>,
}

impl QueueReceiver {
    /// Waits for the next file. `None` once every sender is gone and the
    /// queue is drained.
    pub async fn dequeue(&self) -> Option<PendingFile> {
        self.rx.lock().await.recv().await
    }
}
