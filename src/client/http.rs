// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP client for downloading chunks from presigned URLs.
//!
//! This module provides a low-level HTTP client with:
//! - Connection pooling
//! - Automatic retry with exponential backoff
//! - Cancellation between and during attempts
//! - Configurable timeouts

use crate::client::ChunkFetcher;
use crate::error::{Error, Result};
use crate::types::chunk::ChunkDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle time between reads of a response.
    ///
    /// There is deliberately no total request timeout: the downloader bounds
    /// a whole chunk fetch with its own, much longer, timeout.
    pub read_timeout: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retry attempts (doubles each retry).
    pub retry_delay: Duration,
    /// Maximum number of idle connections per host.
    pub max_connections_per_host: usize,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_delay: Duration::from_millis(1500),
            max_connections_per_host: 100,
            user_agent: format!("snowflake-resultset/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP client for fetching result chunks.
///
/// Presigned URLs carry their own authorization, so no bearer token is
/// attached; the request headers come from the chunk descriptor.
#[derive(Debug, Clone)]
pub struct ChunkHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl ChunkHttpClient {
    /// Creates a new HTTP client with the given configuration.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_max_idle_per_host(config.max_connections_per_host)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// GET a URL with the given headers and return the full body.
    ///
    /// Retries are performed for network errors and for 429, 502, 503 and
    /// 504 responses. Any other non-success status is returned immediately
    /// as [`Error::Http`]. Cancellation returns [`Error::RequestCancelled`].
    pub async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let mut request_builder = self.client.request(Method::GET, url);
            for (key, value) in headers {
                request_builder = request_builder.header(key, value);
            }

            debug!(
                "Executing GET {} (attempt {}/{})",
                url,
                attempts,
                self.config.max_retries + 1
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::RequestCancelled);
                }
                outcome = Self::send(request_builder) => outcome,
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(e) if Self::is_retryable(&e) && attempts <= self.config.max_retries => {
                    warn!(
                        "Request failed (attempt {}/{}): {}, retrying...",
                        attempts,
                        self.config.max_retries + 1,
                        e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(Error::RequestCancelled);
                        }
                        _ = tokio::time::sleep(self.retry_delay_for(attempts)) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send(request_builder: reqwest::RequestBuilder) -> Result<Bytes> {
        let response = request_builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?)
    }

    fn is_retryable(error: &Error) -> bool {
        match error {
            Error::Http { status, .. } => StatusCode::from_u16(*status)
                .map(Self::is_retryable_status)
                .unwrap_or(false),
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            _ => false,
        }
    }

    /// Check if the HTTP status code indicates a retryable error.
    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                | StatusCode::BAD_GATEWAY
        )
    }

    /// Exponential backoff delay before retry `attempt`.
    fn retry_delay_for(&self, attempt: u32) -> Duration {
        self.config.retry_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

#[async_trait]
impl ChunkFetcher for ChunkHttpClient {
    async fn fetch_chunk(
        &self,
        descriptor: &ChunkDescriptor,
        qrmk: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let start = Instant::now();
        let headers = descriptor.request_headers(qrmk);

        debug!(
            "Downloading chunk {} ({} bytes expected)",
            descriptor.chunk_index, descriptor.compressed_size
        );

        let body = self
            .get(&descriptor.url, &headers, cancel)
            .await
            .map_err(|e| match e {
                Error::RequestCancelled => Error::Cancelled {
                    chunk_index: descriptor.chunk_index,
                },
                other => other,
            })?;

        debug!(
            "Fetched chunk {}: {} bytes in {:.2}s",
            descriptor.chunk_index,
            body.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(body)
    }
}
