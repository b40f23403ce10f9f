// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::event_source::Registrar;

/// Directories registered and regular files seen during one walk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Walks `root` and registers every directory, `root` included, with
/// `registrar`.
///
/// Any traversal or registration failure aborts the walk: a half-watched
/// tree silently misses files.
pub fn scan_and_register<R>(root: &Path, registrar: &mut R) -> Result<ScanReport, WatchError>
where
    R: Registrar + ?Sized,
{
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_path_buf()));
    }

    let mut report = ScanReport::default();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| WatchError::Traverse {
            root: root.to_path_buf(),
            source,
        })?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            registrar.register(entry.path())?;
            report.directories.push(entry.into_path());
        } else if file_type.is_file() {
            report.files.push(entry.into_path());
        } else {
            debug!("SCANNER | Skipping {}", entry.path().display());
        }
    }

    info!(
        "SCANNER | Registered {} directories under {} ({} existing files)",
        report.directories.len(),
        root.display(),
        report.files.len()
    );
    Ok(report)
}
