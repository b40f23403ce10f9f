// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the log shipper.
//!
//! Only [`ConfigError`] and [`WatchError`] are fatal; they stop the daemon
//! before any file is touched. [`ProcessError`] and [`SinkError`] are scoped
//! to a single file and are only ever logged.

use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors raised while attaching the filesystem watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to create filesystem watcher: {0}")]
    Create(#[source] notify::Error),

    #[error("Failed to watch directory {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Failed to traverse {root}: {source}")]
    Traverse {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Watch root {0} is not a directory")]
    NotADirectory(PathBuf),
}

/// Reasons a file's contents could not be turned into a log entry.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),

    #[error("schema mismatch: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Failures reported by a [`crate::sink::Sink`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to build sink request: {0}")]
    Request(String),

    #[error("Failed to reach sink after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Sink rejected entries with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Failed to obtain access token: {0}")]
    Credentials(String),

    #[error("Batch write failed: {0}")]
    Batch(String),

    #[error("Sink is closed")]
    Closed,
}

/// Per-file processing failures. None of these stop the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Failed to deliver {path}: {source}")]
    Deliver {
        path: PathBuf,
        #[source]
        source: SinkError,
    },

    #[error("Delivered {path} but failed to remove it: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Read { path, .. }
            | Self::Parse { path, .. }
            | Self::Deliver { path, .. }
            | Self::Remove { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_display() {
        let error = ConfigError::Missing("GCP_PROJECT_ID");
        assert_eq!(
            error.to_string(),
            "GCP_PROJECT_ID environment variable is not set"
        );
    }

    #[test]
    fn test_invalid_value_display() {
        let error = ConfigError::InvalidValue {
            name: "LOG_SHIPPER_WORKERS",
            value: "zero".to_string(),
            reason: "expected a positive integer".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for LOG_SHIPPER_WORKERS: \"zero\" (expected a positive integer)"
        );
    }

    #[test]
    fn test_process_error_path() {
        let error = ProcessError::Read {
            path: PathBuf::from("/logs/a.json"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(error.path(), std::path::Path::new("/logs/a.json"));
        assert!(error.to_string().starts_with("Failed to read /logs/a.json"));
    }

    #[test]
    fn test_sink_rejected_display() {
        let error = SinkError::Rejected {
            status: StatusCode::FORBIDDEN,
            body: "denied".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Sink rejected entries with status 403 Forbidden: denied"
        );
    }
}
