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

//! Error types for the result streaming core.
//!
//! Failures fall into three groups:
//! - usage errors (closed cursor, bad column index, bad option) fail immediately
//! - transport errors (HTTP status, network, cancellation, timeout) are surfaced
//!   when the affected chunk is next needed by the consumer
//! - conversion errors come from the [`CellConverter`](crate::convert::CellConverter)
//!
//! The chunk parser itself never produces an error for any byte sequence.

use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while fetching, decoding or reading a result set.
#[derive(Debug, Error)]
pub enum Error {
    /// Any operation on a result set after `close()`.
    #[error("Result set is already closed")]
    Closed,

    #[error("Column index {index} is out of bounds (column count {column_count})")]
    ColumnIndexOutOfBound { index: usize, column_count: usize },

    /// Cell access before the first `next()` or after exhaustion.
    #[error("Result set is not positioned on a row")]
    NoCurrentRow,

    /// The chunk holds fewer cells than its descriptor announced.
    #[error("Cell ({row}, {column}) is not present in chunk {chunk_index}")]
    CellOutOfRange {
        chunk_index: usize,
        row: usize,
        column: usize,
    },

    #[error("Invalid value for option {key}: {value}")]
    InvalidOption { key: String, value: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Non-success status from the object store.
    #[error("HTTP {status} - {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A transport failure attributed to a specific chunk.
    #[error("Failed to fetch chunk {chunk_index}: {source}")]
    Fetch {
        chunk_index: usize,
        #[source]
        source: Box<Error>,
    },

    /// An HTTP request stopped by its cancellation token.
    #[error("Request was cancelled")]
    RequestCancelled,

    #[error("Download of chunk {chunk_index} was cancelled")]
    Cancelled { chunk_index: usize },

    #[error("Download of chunk {chunk_index} timed out after {timeout:?}")]
    Timeout { chunk_index: usize, timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot convert column {column} to {target}: {message}")]
    Conversion {
        column: usize,
        target: &'static str,
        message: String,
    },

    #[error("Invalid query response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),
}

impl Error {
    /// Attach a chunk index to a transport failure.
    ///
    /// Errors that already identify their chunk are returned unchanged.
    pub fn for_chunk(self, chunk_index: usize) -> Self {
        match self {
            Error::Cancelled { .. } | Error::Timeout { .. } | Error::Fetch { .. } => self,
            Error::RequestCancelled => Error::Cancelled { chunk_index },
            other => Error::Fetch {
                chunk_index,
                source: Box::new(other),
            },
        }
    }

    /// Index of the chunk this error belongs to, if any.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Error::Fetch { chunk_index, .. }
            | Error::Cancelled { chunk_index }
            | Error::Timeout { chunk_index, .. }
            | Error::CellOutOfRange { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }

    /// Whether the failure was caused by cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } | Error::RequestCancelled => true,
            Error::Fetch { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Whether the failure looks like a transient network condition.
    ///
    /// Throttling and gateway statuses, timeouts and connection-level errors
    /// count as transient. Cancellation and usage errors never do.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Error::Network(_) | Error::Timeout { .. } | Error::Io(_) => true,
            Error::Fetch { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
