// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single task that turns watcher events into queued work.
//!
//! Events are consumed in arrival order. Only creates and writes of regular
//! files reach the in-flight gate; a path that is already in flight is
//! dropped rather than queued a second time. Watcher errors are logged and
//! the loop keeps going.

use std::path::{Path, PathBuf};

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::WatchError;
use crate::event_source::{EventStreams, Op, PathEvent, Registrar};
use crate::inflight::InFlightSet;
use crate::queue::{Enqueued, PendingFile, QueueSender};
use crate::scanner::{scan_and_register, ScanReport};

pub struct Dispatcher<R> {
    router: Router<R>,
    streams: EventStreams,
    backlog: Vec<PathBuf>,
    cancel_token: CancellationToken,
}

struct Router<R> {
    registrar: R,
    inflight: InFlightSet,
    queue: QueueSender,
}

impl<R: Registrar> Dispatcher<R> {
    #[must_use]
    pub fn new(
        registrar: R,
        streams: EventStreams,
        inflight: InFlightSet,
        queue: QueueSender,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            router: Router {
                registrar,
                inflight,
                queue,
            },
            streams,
            backlog: Vec::new(),
            cancel_token,
        }
    }

    /// Files to admit before the first event is read.
    #[must_use]
    pub fn with_backlog(mut self, files: Vec<PathBuf>) -> Self {
        self.backlog = files;
        self
    }

    /// Runs until cancelled or until both streams are closed. The queue
    /// sender is dropped on return so workers drain and stop.
    pub async fn spin(self) {
        let Dispatcher {
            mut router,
            streams: EventStreams {
                mut events,
                mut errors,
            },
            backlog,
            cancel_token,
        } = self;

        if !backlog.is_empty() {
            debug!("DISPATCH | Admitting {} existing files", backlog.len());
            for path in backlog {
                router.admit(path).await;
            }
        }

        let mut events_open = true;
        let mut errors_open = true;
        while events_open || errors_open {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => {
                    debug!("DISPATCH | Cancelled");
                    break;
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => router.route(event).await,
                    None => {
                        debug!("DISPATCH | Event stream closed");
                        events_open = false;
                    }
                },
                watch_error = errors.recv(), if errors_open => match watch_error {
                    Some(e) => error!("DISPATCH | Watcher error: {e}"),
                    None => {
                        debug!("DISPATCH | Error stream closed");
                        errors_open = false;
                    }
                },
            }
        }

        debug!("DISPATCH | Stopped");
    }
}

impl<R: Registrar> Router<R> {
    async fn route(&mut self, event: PathEvent) {
        if event.op == Op::Other {
            trace!("DISPATCH | Ignoring event for {}", event.path.display());
            return;
        }

        // A path can be gone by the time its event is read.
        let metadata = match tokio::fs::symlink_metadata(&event.path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("DISPATCH | Cannot stat {}: {e}", event.path.display());
                return;
            }
        };

        if metadata.is_dir() {
            if event.op == Op::Create {
                self.watch_new_directory(&event.path).await;
            }
        } else if metadata.is_file() {
            self.admit(event.path).await;
        } else {
            trace!("DISPATCH | Skipping non-regular {}", event.path.display());
        }
    }

    /// Registers a directory created after startup, together with anything
    /// below it, and admits the files written before the watch existed.
    async fn watch_new_directory(&mut self, dir: &Path) {
        match scan_off_reactor(dir, &mut self.registrar) {
            Ok(report) => {
                for file in report.files {
                    self.admit(file).await;
                }
            }
            Err(e) => error!("DISPATCH | Failed to watch new directory: {e}"),
        }
    }

    async fn admit(&mut self, path: PathBuf) {
        let Some(guard) = self.inflight.try_acquire(path) else {
            return;
        };
        let file = PendingFile::new(guard);
        trace!("DISPATCH | Queueing {}", file.path().display());
        match self.queue.enqueue(file).await {
            Enqueued::Queued => {}
            Enqueued::Dropped | Enqueued::Closed => {
                debug!("DISPATCH | Work queue did not accept file");
            }
        }
    }
}

/// Runs the blocking directory walk without stalling other tasks on this
/// worker. A current-thread runtime has no other worker to hand off to.
fn scan_off_reactor<R: Registrar + ?Sized>(
    dir: &Path,
    registrar: &mut R,
) -> Result<ScanReport, WatchError> {
    let multi_thread = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread {
        tokio::task::block_in_place(|| scan_and_register(dir, registrar))
    } else {
        scan_and_register(dir, registrar)
    }
}
