// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::processor::Settle;
use crate::queue::BackpressurePolicy;

pub const PROJECT_ID_VAR: &str = "GCP_PROJECT_ID";
pub const LOG_ID_VAR: &str = "LOG_ID";

const DEFAULT_WATCH_PATH: &str = "/logs";
const DEFAULT_QUEUE_CAPACITY: usize = 100;
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_SETTLE_MS: u64 = 100;
const DEFAULT_LOGGING_URL: &str = "https://logging.googleapis.com";
const DEFAULT_RESOURCE_TYPE: &str = "global";
const DEFAULT_SINK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SINK_MAX_RETRIES: u32 = 3;
const MAX_SINK_RETRIES: u32 = 10;
const DEFAULT_METADATA_URL: &str = "http://metadata.google.internal";
const DEFAULT_BATCH_MAX_ENTRIES: usize = 100;
// Checks for the stable-size settle mode, each `settle_ms` apart.
const STABLE_SETTLE_MAX_CHECKS: u32 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    /// Cloud project that owns the log stream.
    pub project_id: String,
    /// Name of the log stream entries are written to.
    pub log_id: String,
    pub watch_path: PathBuf,
    pub queue_capacity: usize,
    pub workers: usize,
    pub backpressure: BackpressurePolicy,
    pub settle: Settle,
    /// Enqueue files that already sit in the watch tree at startup.
    pub process_existing: bool,
    pub logging_url: String,
    /// Static bearer token. When unset, tokens come from the metadata server.
    pub access_token: Option<String>,
    pub metadata_url: String,
    pub resource_type: String,
    pub sink_timeout: Duration,
    pub sink_max_retries: u32,
    pub batch_max_entries: usize,
    pub proxy_url: Option<String>,
}

impl Config {
    pub fn new() -> Result<Config, ConfigError> {
        let project_id = required(PROJECT_ID_VAR)?;
        let log_id = required(LOG_ID_VAR)?;

        let settle_delay =
            Duration::from_millis(parsed("LOG_SHIPPER_SETTLE_MS", DEFAULT_SETTLE_MS)?);
        let settle = match optional("LOG_SHIPPER_SETTLE_MODE")
            .map(|mode| mode.to_lowercase())
            .as_deref()
        {
            None | Some("fixed") => Settle::Fixed(settle_delay),
            Some("stable") => Settle::Stable {
                interval: settle_delay,
                max_checks: STABLE_SETTLE_MAX_CHECKS,
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "LOG_SHIPPER_SETTLE_MODE",
                    value: other.to_string(),
                    reason: "expected `fixed` or `stable`".to_string(),
                })
            }
        };

        let backpressure = match optional("LOG_SHIPPER_BACKPRESSURE") {
            None => BackpressurePolicy::Block,
            Some(value) => {
                value
                    .parse::<BackpressurePolicy>()
                    .map_err(|reason| ConfigError::InvalidValue {
                        name: "LOG_SHIPPER_BACKPRESSURE",
                        value,
                        reason,
                    })?
            }
        };

        Ok(Config {
            project_id,
            log_id,
            watch_path: optional("LOG_SHIPPER_WATCH_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_WATCH_PATH), PathBuf::from),
            queue_capacity: positive("LOG_SHIPPER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            workers: positive("LOG_SHIPPER_WORKERS", DEFAULT_WORKERS)?,
            backpressure,
            settle,
            process_existing: flag("LOG_SHIPPER_PROCESS_EXISTING")?,
            logging_url: optional("LOG_SHIPPER_LOGGING_URL")
                .unwrap_or_else(|| DEFAULT_LOGGING_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            access_token: optional("LOG_SHIPPER_ACCESS_TOKEN"),
            metadata_url: optional("LOG_SHIPPER_METADATA_URL")
                .unwrap_or_else(|| DEFAULT_METADATA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            resource_type: optional("LOG_SHIPPER_RESOURCE_TYPE")
                .unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string()),
            sink_timeout: Duration::from_secs(parsed(
                "LOG_SHIPPER_SINK_TIMEOUT_SECS",
                DEFAULT_SINK_TIMEOUT_SECS,
            )?),
            sink_max_retries: bounded(
                "LOG_SHIPPER_SINK_MAX_RETRIES",
                DEFAULT_SINK_MAX_RETRIES,
                MAX_SINK_RETRIES,
            )?,
            batch_max_entries: positive(
                "LOG_SHIPPER_BATCH_MAX_ENTRIES",
                DEFAULT_BATCH_MAX_ENTRIES,
            )?,
            proxy_url: optional("LOG_SHIPPER_PROXY_HTTPS").or_else(|| optional("HTTPS_PROXY")),
        })
    }

    /// Fully qualified log name, `projects/{project}/logs/{log_id}`.
    #[must_use]
    pub fn log_name(&self) -> String {
        format!("projects/{}/logs/{}", self.project_id, self.log_id)
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
                value,
            }),
    }
}

fn positive<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parsed(name, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn bounded<T>(name: &'static str, default: T, max: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = positive(name, default)?;
    if value > max {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason: format!("must be at most {max}"),
        });
    }
    Ok(value)
}

fn flag(name: &'static str) -> Result<bool, ConfigError> {
    match optional(name).map(|value| value.to_lowercase()).as_deref() {
        None | Some("false" | "0" | "no") => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            name,
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use duplicate::duplicate_item;
    use serial_test::serial;
    use std::env;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::Config;
    use crate::processor::Settle;
    use crate::queue::BackpressurePolicy;

    const OPTIONAL_VARS: &[&str] = &[
        "LOG_SHIPPER_WATCH_PATH",
        "LOG_SHIPPER_QUEUE_CAPACITY",
        "LOG_SHIPPER_WORKERS",
        "LOG_SHIPPER_BACKPRESSURE",
        "LOG_SHIPPER_SETTLE_MS",
        "LOG_SHIPPER_SETTLE_MODE",
        "LOG_SHIPPER_PROCESS_EXISTING",
        "LOG_SHIPPER_LOGGING_URL",
        "LOG_SHIPPER_ACCESS_TOKEN",
        "LOG_SHIPPER_METADATA_URL",
        "LOG_SHIPPER_RESOURCE_TYPE",
        "LOG_SHIPPER_SINK_TIMEOUT_SECS",
        "LOG_SHIPPER_SINK_MAX_RETRIES",
        "LOG_SHIPPER_BATCH_MAX_ENTRIES",
        "LOG_SHIPPER_PROXY_HTTPS",
        "HTTPS_PROXY",
    ];

    fn reset_env() {
        env::remove_var("GCP_PROJECT_ID");
        env::remove_var("LOG_ID");
        for var in OPTIONAL_VARS {
            env::remove_var(var);
        }
    }

    fn set_required() {
        env::set_var("GCP_PROJECT_ID", "my-project");
        env::set_var("LOG_ID", "application-logs");
    }

    #[test]
    #[serial]
    fn test_error_if_no_project_id() {
        reset_env();
        env::set_var("LOG_ID", "application-logs");
        let config = Config::new();
        assert_eq!(
            config.unwrap_err().to_string(),
            "GCP_PROJECT_ID environment variable is not set"
        );
        reset_env();
    }

    #[test]
    #[serial]
    fn test_error_if_no_log_id() {
        reset_env();
        env::set_var("GCP_PROJECT_ID", "my-project");
        let config = Config::new();
        assert_eq!(
            config.unwrap_err().to_string(),
            "LOG_ID environment variable is not set"
        );
        reset_env();
    }

    #[test]
    #[serial]
    fn test_empty_required_value_is_missing() {
        reset_env();
        env::set_var("GCP_PROJECT_ID", "  ");
        env::set_var("LOG_ID", "application-logs");
        assert!(Config::new().is_err());
        reset_env();
    }

    #[test]
    #[serial]
    fn test_defaults() {
        reset_env();
        set_required();
        let config = Config::new().expect("config should load");
        assert_eq!(config.watch_path, PathBuf::from("/logs"));
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.workers, 1);
        assert_eq!(config.backpressure, BackpressurePolicy::Block);
        assert_eq!(config.settle, Settle::Fixed(Duration::from_millis(100)));
        assert!(!config.process_existing);
        assert_eq!(config.logging_url, "https://logging.googleapis.com");
        assert_eq!(config.access_token, None);
        assert_eq!(config.metadata_url, "http://metadata.google.internal");
        assert_eq!(config.resource_type, "global");
        assert_eq!(config.sink_timeout, Duration::from_secs(10));
        assert_eq!(config.sink_max_retries, 3);
        assert_eq!(config.batch_max_entries, 100);
        assert_eq!(config.proxy_url, None);
        assert_eq!(config.log_name(), "projects/my-project/logs/application-logs");
        reset_env();
    }

    #[test]
    #[serial]
    fn test_overrides() {
        reset_env();
        set_required();
        env::set_var("LOG_SHIPPER_WATCH_PATH", "/var/spool/logs");
        env::set_var("LOG_SHIPPER_QUEUE_CAPACITY", "8");
        env::set_var("LOG_SHIPPER_WORKERS", "4");
        env::set_var("LOG_SHIPPER_BACKPRESSURE", "DROP");
        env::set_var("LOG_SHIPPER_SETTLE_MS", "250");
        env::set_var("LOG_SHIPPER_SETTLE_MODE", "stable");
        env::set_var("LOG_SHIPPER_PROCESS_EXISTING", "true");
        env::set_var("LOG_SHIPPER_LOGGING_URL", "http://127.0.0.1:8080/");
        env::set_var("LOG_SHIPPER_ACCESS_TOKEN", "token");
        env::set_var("LOG_SHIPPER_METADATA_URL", "http://127.0.0.1:8081/");
        env::set_var("LOG_SHIPPER_SINK_MAX_RETRIES", "10");
        env::set_var("HTTPS_PROXY", "http://proxy:3128");
        let config = Config::new().expect("config should load");
        assert_eq!(config.watch_path, PathBuf::from("/var/spool/logs"));
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.workers, 4);
        assert_eq!(config.backpressure, BackpressurePolicy::Drop);
        assert_eq!(
            config.settle,
            Settle::Stable {
                interval: Duration::from_millis(250),
                max_checks: 20,
            }
        );
        assert!(config.process_existing);
        assert_eq!(config.logging_url, "http://127.0.0.1:8080");
        assert_eq!(config.access_token.as_deref(), Some("token"));
        assert_eq!(config.metadata_url, "http://127.0.0.1:8081");
        assert_eq!(config.sink_max_retries, 10);
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));
        reset_env();
    }

    #[test]
    #[serial]
    fn test_shipper_proxy_takes_precedence() {
        reset_env();
        set_required();
        env::set_var("HTTPS_PROXY", "http://proxy:3128");
        env::set_var("LOG_SHIPPER_PROXY_HTTPS", "http://other:3128");
        let config = Config::new().expect("config should load");
        assert_eq!(config.proxy_url.as_deref(), Some("http://other:3128"));
        reset_env();
    }

    #[duplicate_item(
        test_name                         var                              value;
        [test_invalid_queue_capacity]     ["LOG_SHIPPER_QUEUE_CAPACITY"]   ["lots"];
        [test_zero_queue_capacity]        ["LOG_SHIPPER_QUEUE_CAPACITY"]   ["0"];
        [test_zero_workers]               ["LOG_SHIPPER_WORKERS"]          ["0"];
        [test_invalid_backpressure]       ["LOG_SHIPPER_BACKPRESSURE"]     ["shed"];
        [test_invalid_settle_mode]        ["LOG_SHIPPER_SETTLE_MODE"]      ["debounce"];
        [test_invalid_settle_ms]          ["LOG_SHIPPER_SETTLE_MS"]        ["-5"];
        [test_invalid_process_existing]   ["LOG_SHIPPER_PROCESS_EXISTING"] ["maybe"];
        [test_zero_sink_retries]          ["LOG_SHIPPER_SINK_MAX_RETRIES"] ["0"];
        [test_too_many_sink_retries]      ["LOG_SHIPPER_SINK_MAX_RETRIES"] ["30"];
    )]
    #[test]
    #[serial]
    fn test_name() {
        reset_env();
        set_required();
        env::set_var(var, value);
        let error = Config::new().expect_err("config should be rejected");
        assert!(error.to_string().starts_with(&format!("Invalid value for {}", var)));
        reset_env();
    }
}
