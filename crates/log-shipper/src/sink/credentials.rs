// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bearer tokens for the Cloud Logging API.
//!
//! A static token wins when one is configured. Otherwise tokens come from the
//! instance metadata server and are cached until shortly before they expire.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SinkError;

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";
/// Tokens are refreshed this long before the server says they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Where the sink gets its bearer token from.
#[derive(Clone)]
pub enum Credentials {
    /// Requests carry no `Authorization` header.
    Anonymous,
    Static(String),
    /// Scheme and host of the metadata server.
    Metadata { base_url: String },
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Static(_) => write!(f, "Static(<redacted>)"),
            Self::Metadata { base_url } => write!(f, "Metadata({base_url})"),
        }
    }
}

/// Runtime side of [`Credentials`].
pub(crate) enum TokenSource {
    Anonymous,
    Static(String),
    Metadata(MetadataTokenProvider),
}

impl Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Static(_) => write!(f, "Static(<redacted>)"),
            Self::Metadata(provider) => provider.fmt(f),
        }
    }
}

impl TokenSource {
    pub(crate) fn new(credentials: &Credentials, timeout: Duration) -> Result<Self, SinkError> {
        Ok(match credentials {
            Credentials::Anonymous => Self::Anonymous,
            Credentials::Static(token) => Self::Static(token.clone()),
            Credentials::Metadata { base_url } => Self::Metadata(
                MetadataTokenProvider::new(base_url, timeout)
                    .map_err(|e| SinkError::Request(e.to_string()))?,
            ),
        })
    }

    pub(crate) async fn token(&self) -> Result<Option<String>, SinkError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::Metadata(provider) => provider.token().await.map(Some),
        }
    }

    /// Drops a cached token. Returns `false` when there is nothing to refresh.
    pub(crate) async fn invalidate(&self) -> bool {
        match self {
            Self::Anonymous | Self::Static(_) => false,
            Self::Metadata(provider) => {
                provider.invalidate().await;
                true
            }
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Fetches service-account tokens from the instance metadata server.
pub struct MetadataTokenProvider {
    client: reqwest::Client,
    url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenProvider {
    /// The metadata server is link-local, so no proxy is applied.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), METADATA_TOKEN_PATH),
            cached: Mutex::new(None),
        })
    }

    pub async fn token(&self) -> Result<String, SinkError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let fetched = self.fetch().await?;
        let value = fetched.access_token.clone();
        *cached = Some(CachedToken {
            value: fetched.access_token,
            refresh_at: Instant::now()
                + Duration::from_secs(fetched.expires_in).saturating_sub(REFRESH_MARGIN),
        });
        Ok(value)
    }

    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn fetch(&self) -> Result<TokenResponse, SinkError> {
        let response = self
            .client
            .get(&self.url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .send()
            .await
            .map_err(|e| SinkError::Credentials(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Credentials(format!(
                "metadata server returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| SinkError::Credentials(e.to_string()))?;
        debug!(
            "SINK | Fetched access token from metadata server, expires in {}s",
            token.expires_in
        );
        Ok(token)
    }
}

impl Debug for MetadataTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataTokenProvider")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
