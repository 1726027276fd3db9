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

//! Result set configuration.

use crate::error::{Error, Result};
use crate::logging::LogConfig;
use std::time::Duration;

/// Default number of concurrent chunk downloads (`CLIENT_PREFETCH_THREADS`).
pub const DEFAULT_PREFETCH_THREADS: usize = 4;

/// Default upper bound for downloading and parsing one chunk.
///
/// Large chunks over slow links are expected, so this is far longer than
/// any per-request timeout.
pub const DEFAULT_CHUNK_FETCH_TIMEOUT_SECS: u64 = 3600;

/// Configuration for streaming a result set.
#[derive(Debug, Clone)]
pub struct ResultSetConfig {
    /// Maximum number of chunks fetched concurrently ahead of the consumer.
    pub prefetch_threads: usize,
    /// Upper bound for fetching one chunk.
    pub chunk_fetch_timeout: Duration,
    /// Log warning if download speed falls below this threshold (MB/s).
    pub speed_threshold_mbps: f64,
    /// Record download/wait intervals and log a timeline when the result set ends.
    pub timeline_logging: bool,
    pub log: LogConfig,
}

impl Default for ResultSetConfig {
    fn default() -> Self {
        Self {
            prefetch_threads: DEFAULT_PREFETCH_THREADS,
            chunk_fetch_timeout: Duration::from_secs(DEFAULT_CHUNK_FETCH_TIMEOUT_SECS),
            speed_threshold_mbps: 0.1,
            timeline_logging: false,
            log: LogConfig::default(),
        }
    }
}

impl ResultSetConfig {
    /// Number of ring slots for a result set with `total_chunks` remote chunks.
    pub fn prefetch_slots(&self, total_chunks: usize) -> usize {
        total_chunks.min(self.prefetch_threads.max(1))
    }

    /// Set an option by its string key.
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "snowflake.client_prefetch_threads" => match parse_int_option(value) {
                Some(v) if v >= 1 => {
                    self.prefetch_threads = v as usize;
                    Ok(())
                }
                _ => Err(invalid_option(key, value)),
            },
            "snowflake.chunk_fetch_timeout_ms" => match parse_int_option(value) {
                Some(v) if v > 0 => {
                    self.chunk_fetch_timeout = Duration::from_millis(v as u64);
                    Ok(())
                }
                _ => Err(invalid_option(key, value)),
            },
            "snowflake.chunk_speed_threshold_mbps" => match parse_float_option(value) {
                Some(v) if v >= 0.0 => {
                    self.speed_threshold_mbps = v;
                    Ok(())
                }
                _ => Err(invalid_option(key, value)),
            },
            "snowflake.timeline_logging" => match parse_bool_option(value) {
                Some(v) => {
                    self.timeline_logging = v;
                    Ok(())
                }
                None => Err(invalid_option(key, value)),
            },
            "snowflake.log_level" => {
                self.log.level = Some(value.to_string());
                Ok(())
            }
            "snowflake.log_file" => {
                self.log.file = Some(value.to_string());
                Ok(())
            }
            _ => Err(invalid_option(key, value)),
        }
    }

    /// Get an option by its string key.
    pub fn get_option(&self, key: &str) -> Result<String> {
        match key {
            "snowflake.client_prefetch_threads" => Ok(self.prefetch_threads.to_string()),
            "snowflake.chunk_fetch_timeout_ms" => {
                Ok(self.chunk_fetch_timeout.as_millis().to_string())
            }
            "snowflake.chunk_speed_threshold_mbps" => Ok(self.speed_threshold_mbps.to_string()),
            "snowflake.timeline_logging" => Ok(self.timeline_logging.to_string()),
            "snowflake.log_level" => self
                .log
                .level
                .clone()
                .ok_or_else(|| Error::InvalidState(format!("Option {} is not set", key))),
            "snowflake.log_file" => self
                .log
                .file
                .clone()
                .ok_or_else(|| Error::InvalidState(format!("Option {} is not set", key))),
            _ => Err(Error::InvalidOption {
                key: key.to_string(),
                value: String::new(),
            }),
        }
    }
}

fn invalid_option(key: &str, value: &str) -> Error {
    Error::InvalidOption {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool_option(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_int_option(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

fn parse_float_option(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}
