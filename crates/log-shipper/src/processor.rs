// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turns one queued file into a delivered-or-failed log entry.
//!
//! Each attempt settles, reads, parses, delivers and finally removes the
//! file. The first failing step ends the attempt and the file is left on
//! disk. The [`PendingFile`] is owned by the attempt, so its path leaves the
//! in-flight set on every return.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::entry::LogEntryPayload;
use crate::error::ProcessError;
use crate::queue::{PendingFile, QueueReceiver};
use crate::sink::Sink;

/// How long to wait before reading a file that was just reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settle {
    /// Sleep once for the given duration.
    Fixed(Duration),
    /// Poll size and mtime every `interval` until two consecutive samples
    /// agree, giving up after `max_checks` samples.
    Stable { interval: Duration, max_checks: u32 },
}

impl Default for Settle {
    fn default() -> Self {
        Settle::Fixed(Duration::from_millis(100))
    }
}

impl Settle {
    async fn wait(self, path: &Path) {
        match self {
            Settle::Fixed(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Settle::Stable {
                interval,
                max_checks,
            } => {
                let mut previous = sample(path).await;
                for _ in 0..max_checks {
                    tokio::time::sleep(interval).await;
                    let current = sample(path).await;
                    if current.is_some() && current == previous {
                        return;
                    }
                    previous = current;
                }
                debug!(
                    "PROCESSOR | {} still changing after {} checks, reading anyway",
                    path.display(),
                    max_checks
                );
            }
        }
    }
}

async fn sample(path: &Path) -> Option<(u64, Option<SystemTime>)> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    Some((metadata.len(), metadata.modified().ok()))
}

pub struct FileProcessor {
    sink: Arc<dyn Sink>,
    settle: Settle,
}

impl FileProcessor {
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>, settle: Settle) -> Self {
        Self { sink, settle }
    }

    pub async fn process(&self, file: PendingFile) -> Result<(), ProcessError> {
        let path = file.path().to_path_buf();
        self.settle.wait(&path).await;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| ProcessError::Read {
                path: path.clone(),
                source,
            })?;

        let entry = LogEntryPayload::from_slice(&bytes).map_err(|source| ProcessError::Parse {
            path: path.clone(),
            source,
        })?;

        self.sink
            .deliver(entry.into_record())
            .await
            .map_err(|source| ProcessError::Deliver {
                path: path.clone(),
                source,
            })?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|source| ProcessError::Remove {
                path: path.clone(),
                source,
            })?;

        debug!("PROCESSOR | Delivered and removed {}", path.display());
        Ok(())
    }
}

impl std::fmt::Debug for FileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProcessor")
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}

/// Starts `count` workers draining `receiver`. Each worker returns once the
/// queue is closed and empty.
pub fn spawn_workers(
    count: usize,
    receiver: QueueReceiver,
    processor: Arc<FileProcessor>,
) -> JoinSet<()> {
    let mut workers = JoinSet::new();
    for id in 0..count.max(1) {
        let receiver = receiver.clone();
        let processor = Arc::clone(&processor);
        workers.spawn(async move {
            debug!("WORKER | Worker {id} started");
            while let Some(file) = receiver.dequeue().await {
                if let Err(e) = processor.process(file).await {
                    report(&e);
                }
            }
            debug!("WORKER | Worker {id} stopped, queue closed");
        });
    }
    workers
}

fn report(error: &ProcessError) {
    match error {
        // Delivered already; a leftover file only costs a duplicate later.
        ProcessError::Remove { .. } => warn!("WORKER | {error}"),
        _ => error!("WORKER | {error}"),
    }
}
