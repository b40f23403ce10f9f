// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Gate that keeps a path from being processed twice at the same time.
//!
//! A path is in the set from the moment it is accepted for the work queue
//! until its processing attempt ends, whatever the outcome. Acquiring hands
//! out an [`InFlightGuard`]; dropping the guard releases the path, so every
//! exit path of a worker (including an item discarded by a full or closed
//! queue) gives the path back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

#[derive(Clone, Debug, Default)]
pub struct InFlightSet {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically checks and inserts `path`.
    ///
    /// Returns `None` when the path is already in flight; the caller must
    /// drop the event.
    #[must_use]
    pub fn try_acquire(&self, path: impl Into<PathBuf>) -> Option<InFlightGuard> {
        let path = path.into();
        if !self.lock().insert(path.clone()) {
            trace!("INFLIGHT | {} already in flight", path.display());
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            path,
        })
    }

    /// Only the guard's `Drop` calls this, so a path leaves the set exactly
    /// when its attempt ends.
    fn release(&self, path: &Path) {
        self.lock().remove(path);
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked: every
        // critical section is a single insert, remove or read.
        self.paths
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Proof that a path is in flight. Releases the path when dropped.
#[derive(Debug)]
#[must_use = "dropping the guard releases the path immediately"]
pub struct InFlightGuard {
    set: InFlightSet,
    path: PathBuf,
}

impl InFlightGuard {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.path);
        trace!("INFLIGHT | released {}", self.path.display());
    }
}
