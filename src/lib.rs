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

//! Chunked result streaming for Snowflake query results.
//!
//! A query response carries a small inline rowset plus a list of remote
//! chunks stored in cloud object storage. This crate turns that into a
//! row cursor that downloads and decodes the chunks in the background.
//!
//! ## Overview
//!
//! - [`ResultSetFactory`] - Builds a cursor from a [`QueryResultData`]
//! - [`ResultSet`] - Async cursor, suspends only while a chunk is in flight
//! - [`BlockingResultSet`] - Same cursor for synchronous callers
//! - [`ChunkDownloader`] - Bounded, in-order prefetch over a ring of reusable buffers
//! - [`ChunkFetcher`] - Fetch collaborator, [`ChunkHttpClient`] for presigned URLs
//! - [`CellConverter`] - Conversion collaborator, [`TextConverter`] by default
//!
//! ## Example
//!
//! ```ignore
//! use snowflake_resultset::{ChunkHttpClient, HttpClientConfig, QueryResultData};
//! use snowflake_resultset::{ResultSetConfig, ResultSetFactory};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let data = QueryResultData::from_json(&response_body)?;
//! let fetcher = Arc::new(ChunkHttpClient::new(HttpClientConfig::default())?);
//! let factory = ResultSetFactory::new(fetcher, ResultSetConfig::default(), handle);
//!
//! let mut rs = factory.create(&data, &CancellationToken::new())?;
//! while rs.next().await? {
//!     let id = rs.get_i64(0)?;
//!     let name = rs.get_str(1)?;
//! }
//! ```
//!
//! ## Configuration Options
//!
//! Set through [`ResultSetConfig::set_option`].
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `snowflake.client_prefetch_threads` | 4 | Chunks fetched concurrently (bounded by chunk count) |
//! | `snowflake.chunk_fetch_timeout_ms` | 3600000 | Upper bound for fetching one chunk |
//! | `snowflake.chunk_speed_threshold_mbps` | 0.1 | Slow download warning threshold |
//! | `snowflake.timeline_logging` | false | Log a download/wait timeline when the result set ends |
//! | `snowflake.log_level` | - | OFF, ERROR, WARN, INFO, DEBUG or TRACE |
//! | `snowflake.log_file` | - | Log file path, stderr when unset |

pub mod client;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod reader;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use reader::arrow::ChunkBatchReader;
pub use reader::chunk_buffer::{Cell, ChunkBuffer};
pub use reader::cursor::{BlockingResultSet, CursorState, ResultSet};
pub use reader::downloader::{ChunkDownloader, RemoteChunks};
pub use reader::ResultSetFactory;

// Re-export collaborator types
pub use client::{ChunkFetcher, ChunkHttpClient, HttpClientConfig};
pub use convert::{CellConverter, Representation, TextConverter, Value};
pub use diagnostics::{DiagnosticsSink, NoopDiagnostics, TimelineRecorder};

// Re-export configuration and envelope types
pub use types::chunk::ChunkDescriptor;
pub use types::config::ResultSetConfig;
pub use types::response::{ColumnMeta, ColumnType, QueryResultData};
