// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::entry::DeliveryRecord;
use crate::error::SinkError;
use crate::sink::credentials::{Credentials, TokenSource};
use crate::sink::{EntryWriter, Sink};

const WRITE_ENTRIES_PATH: &str = "/v2/entries:write";
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
// Backoff stops doubling after this many retries.
const MAX_BACKOFF_EXPONENT: u32 = 6;

#[derive(Debug, Clone)]
pub struct CloudLoggingConfig {
    /// Scheme and host, e.g. `https://logging.googleapis.com`.
    pub base_url: String,
    /// `projects/{project}/logs/{log_id}`.
    pub log_name: String,
    pub resource_type: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    /// Total attempts for transient failures, first try included.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each retry.
    pub retry_backoff: Duration,
    pub proxy_url: Option<String>,
}

impl From<&Config> for CloudLoggingConfig {
    fn from(config: &Config) -> Self {
        CloudLoggingConfig {
            base_url: config.logging_url.clone(),
            log_name: config.log_name(),
            resource_type: config.resource_type.clone(),
            credentials: match &config.access_token {
                Some(token) => Credentials::Static(token.clone()),
                None => Credentials::Metadata {
                    base_url: config.metadata_url.clone(),
                },
            },
            timeout: config.sink_timeout,
            max_attempts: config.sink_max_retries,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            proxy_url: config.proxy_url.clone(),
        }
    }
}

#[derive(Serialize)]
struct MonitoredResource<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
}

#[derive(Serialize)]
struct WriteEntriesRequest<'a> {
    #[serde(rename = "logName")]
    log_name: &'a str,
    resource: MonitoredResource<'a>,
    entries: &'a [DeliveryRecord],
}

/// HTTP writer for the Cloud Logging `entries:write` endpoint.
#[derive(Debug, Clone)]
pub struct CloudLoggingClient {
    client: reqwest::Client,
    url: String,
    tokens: Arc<TokenSource>,
    config: CloudLoggingConfig,
}

impl CloudLoggingClient {
    pub fn new(config: CloudLoggingConfig) -> Result<Self, SinkError> {
        let client = build_client(config.proxy_url.as_deref(), config.timeout)
            .map_err(|e| SinkError::Request(e.to_string()))?;
        let tokens = TokenSource::new(&config.credentials, config.timeout)?;
        let url = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            WRITE_ENTRIES_PATH
        );
        Ok(CloudLoggingClient {
            client,
            url,
            tokens: Arc::new(tokens),
            config,
        })
    }

    fn create_request(
        &self,
        body: &WriteEntriesRequest<'_>,
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let request = self.client.post(&self.url).json(body);
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, records: &[DeliveryRecord]) -> Result<(), SinkError> {
        let body = WriteEntriesRequest {
            log_name: &self.config.log_name,
            resource: MonitoredResource {
                resource_type: &self.config.resource_type,
            },
            entries: records,
        };
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;
        let mut reauthorized = false;

        loop {
            attempts += 1;
            let token = match self.tokens.token().await {
                Ok(token) => token,
                Err(e) => {
                    error!("SINK | {e}");
                    return Err(e);
                }
            };
            let time = Instant::now();
            let response = self.create_request(&body, token.as_deref()).send().await;
            let elapsed = time.elapsed();

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!(
                            "SINK | Wrote {} entries in {} ms",
                            records.len(),
                            elapsed.as_millis()
                        );
                        return Ok(());
                    }
                    // One fresh token per send; a second 401 is final.
                    if status == StatusCode::UNAUTHORIZED
                        && !reauthorized
                        && self.tokens.invalidate().await
                    {
                        warn!("SINK | Access token rejected, fetching a new one");
                        reauthorized = true;
                        continue;
                    }
                    if !is_retryable(status) || attempts >= max_attempts {
                        let body = resp.text().await.unwrap_or_default();
                        error!("SINK | Entries rejected with status {status}: {body}");
                        return Err(SinkError::Rejected { status, body });
                    }
                    warn!("SINK | Status {status} on attempt {attempts}, retrying");
                }
                Err(e) => {
                    if attempts >= max_attempts {
                        error!(
                            "SINK | Failed to write entries after {} ms and {} attempts: {:?}",
                            elapsed.as_millis(),
                            attempts,
                            e
                        );
                        return Err(SinkError::Transport {
                            attempts,
                            source: e,
                        });
                    }
                    warn!("SINK | Network error (attempt {attempts}): {e}");
                }
            }

            tokio::time::sleep(backoff_delay(self.config.retry_backoff, attempts)).await;
        }
    }
}

/// Exponential backoff after the `attempts`-th failure, `base * 2^(attempts - 1)`,
/// with the exponent capped at [`MAX_BACKOFF_EXPONENT`].
fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    base * 2_u32.pow(attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT))
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}

#[async_trait]
impl EntryWriter for CloudLoggingClient {
    async fn write_entries(&self, records: &[DeliveryRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }
        self.send(records).await
    }
}

#[async_trait]
impl Sink for CloudLoggingClient {
    async fn deliver(&self, record: DeliveryRecord) -> Result<(), SinkError> {
        self.send(std::slice::from_ref(&record)).await
    }
}
