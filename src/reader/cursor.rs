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

//! Result cursor.
//!
//! [`ResultSet`] walks the rows of a query result: first the inline rowset,
//! then every remote chunk in order as the [`ChunkDownloader`] delivers
//! them. It is a small state machine:
//!
//! ```text
//! BeforeFirstRow --next()--> Positioned --next()--> ... --> Exhausted
//!        \                       |                            |
//!         `-------------------- close() ----------------------'--> Closed
//! ```
//!
//! [`ResultSet::next`] only suspends when the current chunk is used up and
//! the next one is still being fetched. [`BlockingResultSet`] drives the same
//! state machine from synchronous code by blocking on the runtime handle.

use crate::convert::{CellConverter, Representation, TextConverter, Value};
use crate::diagnostics::{DiagnosticsSink, WaitStatistic};
use crate::error::{Error, Result};
use crate::reader::chunk_buffer::{Cell, ChunkBuffer};
use crate::reader::downloader::ChunkDownloader;
use crate::types::response::ColumnMeta;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Position of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    BeforeFirstRow,
    Positioned,
    Exhausted,
    Closed,
}

/// Where the current chunk lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CurrentChunk {
    None,
    Inline,
    Downloaded,
}

enum Step {
    Row,
    Exhausted,
    FetchNext,
}

/// Asynchronous cursor over a chunked result set.
pub struct ResultSet<C: CellConverter = TextConverter> {
    query_id: Option<String>,
    columns: Arc<[ColumnMeta]>,
    converter: C,

    inline: Option<ChunkBuffer>,
    downloader: Option<ChunkDownloader>,
    current: CurrentChunk,
    // Row of the current chunk the cursor is on, and the next one to visit.
    row: usize,
    next_row: usize,
    state: CursorState,

    diagnostics: Arc<dyn DiagnosticsSink>,
    created: Instant,
    wait_time: Duration,
    // Time spent in the converter, in nanoseconds. Accessors only take `&self`.
    parse_nanos: AtomicU64,
    rows_returned: u64,
}

impl<C: CellConverter> std::fmt::Debug for ResultSet<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("query_id", &self.query_id)
            .field("column_count", &self.columns.len())
            .field("state", &self.state)
            .field("current", &self.current)
            .field("row", &self.row)
            .field("downloader", &self.downloader)
            .finish()
    }
}

impl<C: CellConverter> ResultSet<C> {
    pub(crate) fn new(
        query_id: Option<String>,
        columns: Vec<ColumnMeta>,
        inline: Option<ChunkBuffer>,
        downloader: Option<ChunkDownloader>,
        converter: C,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let current = if inline.is_some() {
            CurrentChunk::Inline
        } else {
            CurrentChunk::None
        };
        Self {
            query_id,
            columns: columns.into(),
            converter,
            inline,
            downloader,
            current,
            row: 0,
            next_row: 0,
            state: CursorState::BeforeFirstRow,
            diagnostics,
            created: Instant::now(),
            wait_time: Duration::ZERO,
            parse_nanos: AtomicU64::new(0),
            rows_returned: 0,
        }
    }

    /// Move to the next row.
    ///
    /// Returns `Ok(false)` once every row has been visited, and keeps
    /// returning `Ok(false)` afterwards. A failed chunk fetch is returned by
    /// the call that needs that chunk; the cursor has no rows to offer after
    /// that.
    pub async fn next(&mut self) -> Result<bool> {
        loop {
            match self.step()? {
                Step::Row => return Ok(true),
                Step::Exhausted => return Ok(false),
                Step::FetchNext => {
                    if !self.fetch_next_chunk().await? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        match self.state {
            CursorState::Closed => return Err(Error::Closed),
            CursorState::Exhausted => return Ok(Step::Exhausted),
            CursorState::BeforeFirstRow | CursorState::Positioned => {}
        }

        let rows_in_chunk = self.current_chunk().map_or(0, ChunkBuffer::row_count);
        if self.next_row < rows_in_chunk {
            self.row = self.next_row;
            self.next_row += 1;
            self.rows_returned += 1;
            self.state = CursorState::Positioned;
            return Ok(Step::Row);
        }

        if self.downloader.is_none() {
            self.exhaust();
            return Ok(Step::Exhausted);
        }
        Ok(Step::FetchNext)
    }

    /// Replace the current chunk with the next downloaded one.
    ///
    /// Returns `Ok(false)` and exhausts the cursor when there is none.
    async fn fetch_next_chunk(&mut self) -> Result<bool> {
        // The inline chunk is used up once we get here.
        self.inline = None;

        let Some(downloader) = self.downloader.as_mut() else {
            self.current = CurrentChunk::None;
            self.exhaust();
            return Ok(false);
        };

        self.current = CurrentChunk::None;
        let begin = Utc::now();
        let start = Instant::now();
        let next = downloader.next_chunk().await;
        let waited = start.elapsed();

        self.wait_time += waited;
        self.diagnostics.record_wait(WaitStatistic {
            begin,
            end: Utc::now(),
        });

        match next? {
            Some(chunk) => {
                trace!(
                    "Cursor moved to chunk {} ({} rows) after waiting {} ms",
                    chunk.chunk_index(),
                    chunk.row_count(),
                    waited.as_millis()
                );
                self.current = CurrentChunk::Downloaded;
                self.next_row = 0;
                Ok(true)
            }
            None => {
                self.exhaust();
                Ok(false)
            }
        }
    }

    fn exhaust(&mut self) {
        if self.state == CursorState::Exhausted {
            return;
        }
        self.state = CursorState::Exhausted;
        self.current = CurrentChunk::None;

        let elapsed = self.created.elapsed();
        let parse_time = self.parse_time();
        debug!(
            "Result set {} exhausted: {} rows, elapsed {} ms, wait {} ms, parse {} ms, client {} ms",
            self.query_id.as_deref().unwrap_or("<unknown>"),
            self.rows_returned,
            elapsed.as_millis(),
            self.wait_time.as_millis(),
            parse_time.as_millis(),
            elapsed
                .saturating_sub(self.wait_time)
                .saturating_sub(parse_time)
                .as_millis()
        );

        // Every wait, including the one that found the end, is recorded by now.
        if self.downloader.is_some() {
            self.diagnostics.finish();
        }
    }

    /// Advance by a whole chunk. Used by the batch reader, which never looks
    /// at individual rows.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<&ChunkBuffer>> {
        match self.state {
            CursorState::Closed => return Err(Error::Closed),
            CursorState::Exhausted => return Ok(None),
            CursorState::BeforeFirstRow if self.current == CurrentChunk::Inline => {}
            CursorState::BeforeFirstRow | CursorState::Positioned => {
                if !self.fetch_next_chunk().await? {
                    return Ok(None);
                }
            }
        }

        self.state = CursorState::Positioned;
        let rows = self.current_chunk().map_or(0, ChunkBuffer::row_count);
        self.rows_returned += rows as u64;
        self.next_row = rows;
        Ok(self.current_chunk())
    }

    fn current_chunk(&self) -> Option<&ChunkBuffer> {
        match self.current {
            CurrentChunk::None => None,
            CurrentChunk::Inline => self.inline.as_ref(),
            CurrentChunk::Downloaded => self.downloader.as_ref().and_then(ChunkDownloader::current),
        }
    }

    /// Raw cell of `column` in the current row.
    pub fn get_cell(&self, column: usize) -> Result<Cell<'_>> {
        if self.state == CursorState::Closed {
            return Err(Error::Closed);
        }
        if column >= self.columns.len() {
            return Err(Error::ColumnIndexOutOfBound {
                index: column,
                column_count: self.columns.len(),
            });
        }
        if self.state != CursorState::Positioned {
            return Err(Error::NoCurrentRow);
        }
        self.current_chunk()
            .ok_or(Error::NoCurrentRow)?
            .extract_cell(self.row, column)
    }

    /// Convert the cell of `column` in the current row to `target`.
    pub fn get_value(&self, column: usize, target: Representation) -> Result<Value> {
        let cell = self.get_cell(column)?;
        let start = Instant::now();
        let value = self
            .converter
            .convert(cell, column, &self.columns[column], target);
        let nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.parse_nanos.fetch_add(nanos, Ordering::Relaxed);
        value
    }

    /// Borrowed text of a cell, without conversion.
    pub fn get_str(&self, column: usize) -> Result<Option<&str>> {
        self.get_cell(column)?
            .as_str()
            .map_err(|e| Error::Conversion {
                column,
                target: "str",
                message: e.to_string(),
            })
    }

    pub fn get_string(&self, column: usize) -> Result<Option<String>> {
        match self.get_value(column, Representation::Text)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v)),
            other => Err(unexpected(column, "text", &other)),
        }
    }

    pub fn get_i64(&self, column: usize) -> Result<Option<i64>> {
        match self.get_value(column, Representation::Int64)? {
            Value::Null => Ok(None),
            Value::Int64(v) => Ok(Some(v)),
            other => Err(unexpected(column, "i64", &other)),
        }
    }

    pub fn get_f64(&self, column: usize) -> Result<Option<f64>> {
        match self.get_value(column, Representation::Float64)? {
            Value::Null => Ok(None),
            Value::Float64(v) => Ok(Some(v)),
            other => Err(unexpected(column, "f64", &other)),
        }
    }

    pub fn get_bool(&self, column: usize) -> Result<Option<bool>> {
        match self.get_value(column, Representation::Boolean)? {
            Value::Null => Ok(None),
            Value::Boolean(v) => Ok(Some(v)),
            other => Err(unexpected(column, "bool", &other)),
        }
    }

    pub fn get_bytes(&self, column: usize) -> Result<Option<Vec<u8>>> {
        match self.get_value(column, Representation::Binary)? {
            Value::Null => Ok(None),
            Value::Binary(v) => Ok(Some(v)),
            other => Err(unexpected(column, "binary", &other)),
        }
    }

    pub fn is_null(&self, column: usize) -> Result<bool> {
        Ok(self.get_cell(column)?.is_null())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// Time spent waiting for chunks.
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Time spent converting cells in [`get_value`](Self::get_value) and the
    /// typed accessors.
    pub fn parse_time(&self) -> Duration {
        Duration::from_nanos(self.parse_nanos.load(Ordering::Relaxed))
    }

    /// Number of rows visited so far.
    pub fn rows_returned(&self) -> u64 {
        self.rows_returned
    }

    /// Close the cursor. In-flight fetches are cancelled and every buffer is
    /// released. Every later call fails with [`Error::Closed`].
    pub fn close(&mut self) {
        if self.state == CursorState::Closed {
            return;
        }
        debug!(
            "Closing result set {} after {} rows",
            self.query_id.as_deref().unwrap_or("<unknown>"),
            self.rows_returned
        );
        self.state = CursorState::Closed;
        self.current = CurrentChunk::None;
        self.inline = None;
        self.downloader = None;
    }
}

fn unexpected(column: usize, target: &'static str, value: &Value) -> Error {
    Error::Conversion {
        column,
        target,
        message: format!("converter returned {:?}", value),
    }
}

/// Blocking cursor for synchronous callers.
///
/// Shares the state machine of [`ResultSet`]; `next()` blocks the calling
/// thread while a chunk is being fetched. It must not be used from inside
/// an async context of the same runtime.
///
/// Read-only accessors are reached through `Deref`.
pub struct BlockingResultSet<C: CellConverter = TextConverter> {
    inner: ResultSet<C>,
    runtime_handle: Handle,
}

impl<C: CellConverter> std::fmt::Debug for BlockingResultSet<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingResultSet")
            .field("inner", &self.inner)
            .finish()
    }
}

impl<C: CellConverter> BlockingResultSet<C> {
    pub(crate) fn new(inner: ResultSet<C>, runtime_handle: Handle) -> Self {
        Self {
            inner,
            runtime_handle,
        }
    }

    /// Move to the next row, blocking until its chunk is available.
    pub fn next(&mut self) -> Result<bool> {
        self.runtime_handle.block_on(self.inner.next())
    }

    pub fn close(&mut self) {
        self.inner.close();
    }

    pub(crate) fn next_chunk(&mut self) -> Result<Option<&ChunkBuffer>> {
        self.runtime_handle.block_on(self.inner.next_chunk())
    }

    pub fn into_inner(self) -> ResultSet<C> {
        self.inner
    }
}

impl<C: CellConverter> std::ops::Deref for BlockingResultSet<C> {
    type Target = ResultSet<C>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
