// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Adapter from `notify` filesystem notifications to path-level events.
//!
//! The watcher callback runs on notify's own thread. It converts every raw
//! event into one [`PathEvent`] per affected path and pushes it, or the
//! watcher error, into unbounded tokio channels consumed by the dispatch
//! loop. Directories are registered one at a time through [`Registrar`];
//! the scanner walks the tree itself, so registration is non-recursive.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::WatchError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Create,
    Write,
    Other,
}

impl From<&EventKind> for Op {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => Op::Create,
            // A rename into the tree is how atomic writers publish files.
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => Op::Create,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Op::Write,
            _ => Op::Other,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathEvent {
    pub path: PathBuf,
    pub op: Op,
}

/// Receiving halves consumed by the dispatch loop.
#[derive(Debug)]
pub struct EventStreams {
    pub events: mpsc::UnboundedReceiver<PathEvent>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

/// Sending halves fed by a watcher callback.
#[derive(Clone, Debug)]
pub struct EventSenders {
    events: mpsc::UnboundedSender<PathEvent>,
    errors: mpsc::UnboundedSender<notify::Error>,
}

#[must_use]
pub fn event_channels() -> (EventSenders, EventStreams) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (errors_tx, errors_rx) = mpsc::unbounded_channel();
    (
        EventSenders {
            events: events_tx,
            errors: errors_tx,
        },
        EventStreams {
            events: events_rx,
            errors: errors_rx,
        },
    )
}

impl EventSenders {
    /// Converts one watcher callback result and forwards it.
    pub fn forward(&self, result: notify::Result<Event>) {
        match result {
            Ok(event) => {
                let op = Op::from(&event.kind);
                for path in event.paths {
                    self.send_event(PathEvent { path, op });
                }
            }
            Err(e) => self.send_error(e),
        }
    }

    pub fn send_event(&self, event: PathEvent) {
        if let Err(e) = self.events.send(event) {
            debug!(
                "WATCHER | Event stream closed, dropping event for {}",
                e.0.path.display()
            );
        }
    }

    pub fn send_error(&self, error: notify::Error) {
        if self.errors.send(error).is_err() {
            debug!("WATCHER | Error stream closed, dropping watcher error");
        }
    }
}

/// Something directories can be registered with.
pub trait Registrar {
    fn register(&mut self, dir: &Path) -> Result<(), WatchError>;
}

/// Event source backed by the platform's recommended `notify` watcher.
pub struct NotifyEventSource {
    watcher: RecommendedWatcher,
}

impl NotifyEventSource {
    pub fn new() -> Result<(Self, EventStreams), WatchError> {
        let (senders, streams) = event_channels();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            senders.forward(result);
        })
        .map_err(WatchError::Create)?;
        Ok((Self { watcher }, streams))
    }
}

impl Registrar for NotifyEventSource {
    fn register(&mut self, dir: &Path) -> Result<(), WatchError> {
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|source| {
                error!("WATCHER | Failed to watch {}: {}", dir.display(), source);
                WatchError::Register {
                    path: dir.to_path_buf(),
                    source,
                }
            })?;
        debug!("WATCHER | Watching {}", dir.display());
        Ok(())
    }
}

impl std::fmt::Debug for NotifyEventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotifyEventSource")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_op_mapping() {
        assert_eq!(Op::from(&EventKind::Create(CreateKind::File)), Op::Create);
        assert_eq!(Op::from(&EventKind::Create(CreateKind::Folder)), Op::Create);
        assert_eq!(
            Op::from(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Op::Create
        );
        assert_eq!(
            Op::from(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Op::Write
        );
        assert_eq!(Op::from(&EventKind::Modify(ModifyKind::Any)), Op::Write);
        assert_eq!(
            Op::from(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Op::Other
        );
        assert_eq!(
            Op::from(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Op::Other
        );
        assert_eq!(Op::from(&EventKind::Remove(RemoveKind::File)), Op::Other);
        assert_eq!(Op::from(&EventKind::Access(AccessKind::Any)), Op::Other);
    }

    #[tokio::test]
    async fn test_forward_splits_paths() {
        let (senders, mut streams) = event_channels();
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/logs/a.json"))
            .add_path(PathBuf::from("/logs/b.json"));
        senders.forward(Ok(event));

        let first = streams.events.recv().await.expect("first event");
        let second = streams.events.recv().await.expect("second event");
        assert_eq!(first.path, PathBuf::from("/logs/a.json"));
        assert_eq!(second.path, PathBuf::from("/logs/b.json"));
        assert_eq!(first.op, Op::Create);
    }

    #[tokio::test]
    async fn test_forward_routes_errors() {
        let (senders, mut streams) = event_channels();
        senders.forward(Err(notify::Error::generic("queue overflow")));
        let error = streams.errors.recv().await.expect("error");
        assert!(error.to_string().contains("queue overflow"));
        assert!(streams.events.try_recv().is_err());
    }

    #[test]
    fn test_forward_after_close_does_not_panic() {
        let (senders, streams) = event_channels();
        drop(streams);
        senders.forward(Ok(Event::new(EventKind::Any).add_path(PathBuf::from("/x"))));
        senders.forward(Err(notify::Error::generic("late")));
    }

    #[tokio::test]
    async fn test_notify_source_reports_new_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut source, mut streams) = NotifyEventSource::new().expect("watcher");
        source.register(dir.path()).expect("register");

        let path = dir.path().join("entry.json");
        std::fs::write(&path, b"{}").expect("write");

        let seen = timeout(Duration::from_secs(5), async {
            while let Some(event) = streams.events.recv().await {
                if event.path == path && event.op != Op::Other {
                    return true;
                }
            }
            false
        })
        .await
        .expect("timed out waiting for event");
        assert!(seen);
    }

    #[test]
    fn test_register_missing_directory_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing");
        let (mut source, _streams) = NotifyEventSource::new().expect("watcher");
        let err = source.register(&missing).unwrap_err();
        assert!(matches!(err, WatchError::Register { .. }));
    }
}
