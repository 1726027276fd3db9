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

//! Prefetching chunk downloader.
//!
//! The downloader owns a fixed ring of `prefetch_slots` chunk buffers, where
//! `prefetch_slots = min(total_chunks, prefetch_threads)`. Chunk `i` always
//! lives in slot `i % prefetch_slots`:
//!
//! ```text
//!            slot 0        slot 1        slot 2
//! start:   [fetch #0]    [fetch #1]    [fetch #2]
//! next():  [lent  #0]    [fetch #1]    [fetch #2]      -> #0
//! next():  [fetch #3]    [lent  #1]    [fetch #2]      -> #1
//! next():  [fetch #3]    [fetch #4]    [lent  #2]      -> #2
//! ```
//!
//! Each fetch runs as a tokio task that owns its slot's buffer until it
//! finishes and hands the parsed buffer back through its `JoinHandle`. The
//! consumer always awaits the slot of the next chunk in order, never
//! whichever fetch finished first, so chunks are delivered in ascending index
//! order. A slot is only refilled once the consumer has given back the chunk
//! it was reading, which bounds both memory and in-flight requests to
//! `prefetch_slots`, and buffers are allocated only once per slot.

use crate::client::ChunkFetcher;
use crate::diagnostics::{DiagnosticsSink, DownloadStatistic};
use crate::error::{Error, Result};
use crate::reader::chunk_buffer::ChunkBuffer;
use crate::reader::parser::parse_chunk;
use crate::types::chunk::ChunkDescriptor;
use crate::types::config::ResultSetConfig;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// The remote part of a result set.
#[derive(Debug, Clone)]
pub struct RemoteChunks {
    /// Cells per row, fixed for the whole result set.
    pub column_count: usize,
    /// Descriptors ordered by chunk index.
    pub descriptors: Vec<ChunkDescriptor>,
    /// Query result master key shared by all chunks.
    pub qrmk: Option<String>,
}

enum Slot {
    /// Allocated but not assigned to any chunk.
    Idle(ChunkBuffer),
    /// A fetch task owns the buffer.
    Pending(JoinHandle<Result<ChunkBuffer>>),
    /// Handed to the consumer for reading.
    Lent(ChunkBuffer),
    /// The buffer went down with a failed fetch.
    Lost,
}

/// Downloads chunks with bounded prefetch and serves them in order.
pub struct ChunkDownloader {
    descriptors: Arc<[ChunkDescriptor]>,
    qrmk: Option<Arc<str>>,
    fetcher: Arc<dyn ChunkFetcher>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    fetch_timeout: Duration,
    speed_threshold_mbps: f64,

    slots: Vec<Slot>,
    next_to_download: usize,
    next_to_consume: usize,
    lent: Option<usize>,

    poisoned: bool,
    finished: bool,

    // Child of the caller's token, cancelled on drop.
    cancel_token: CancellationToken,
    runtime_handle: Handle,
}

impl std::fmt::Debug for ChunkDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDownloader")
            .field("total_chunks", &self.descriptors.len())
            .field("prefetch_slots", &self.slots.len())
            .field("next_to_download", &self.next_to_download)
            .field("next_to_consume", &self.next_to_consume)
            .field("outstanding", &self.outstanding())
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

impl ChunkDownloader {
    /// Create the downloader and immediately start fetching the first
    /// `prefetch_slots` chunks.
    ///
    /// # Arguments
    /// * `chunks` - Remote chunk descriptors, column count and master key
    /// * `fetcher` - Fetch collaborator used for every chunk
    /// * `config` - Prefetch width, fetch timeout and speed threshold
    /// * `cancel` - External cancellation signal observed by every fetch
    /// * `runtime_handle` - Runtime the fetch tasks are spawned on
    /// * `diagnostics` - Receives one record per completed download
    pub fn new(
        chunks: RemoteChunks,
        fetcher: Arc<dyn ChunkFetcher>,
        config: &ResultSetConfig,
        cancel: &CancellationToken,
        runtime_handle: Handle,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let prefetch_slots = config.prefetch_slots(chunks.descriptors.len());
        let slots = (0..prefetch_slots)
            .map(|_| Slot::Idle(ChunkBuffer::new(chunks.column_count)))
            .collect();

        let mut downloader = Self {
            descriptors: chunks.descriptors.into(),
            qrmk: chunks.qrmk.map(Arc::from),
            fetcher,
            diagnostics,
            fetch_timeout: config.chunk_fetch_timeout,
            speed_threshold_mbps: config.speed_threshold_mbps,
            slots,
            next_to_download: 0,
            next_to_consume: 0,
            lent: None,
            poisoned: false,
            finished: false,
            cancel_token: cancel.child_token(),
            runtime_handle,
        };

        debug!(
            "Starting chunk downloader: {} chunks, {} prefetch slots",
            downloader.descriptors.len(),
            prefetch_slots
        );

        for slot in 0..prefetch_slots {
            if let Slot::Idle(buffer) = std::mem::replace(&mut downloader.slots[slot], Slot::Lost) {
                downloader.launch(buffer);
            }
        }

        downloader
    }

    /// Total number of remote chunks.
    pub fn total_chunks(&self) -> usize {
        self.descriptors.len()
    }

    /// Number of ring slots.
    pub fn prefetch_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of fetches started and not yet handed to the consumer.
    pub fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }

    /// The chunk most recently returned by [`next_chunk`](Self::next_chunk).
    pub fn current(&self) -> Option<&ChunkBuffer> {
        match self.lent.map(|slot| &self.slots[slot]) {
            Some(Slot::Lent(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// Wait for the next chunk in index order.
    ///
    /// The chunk returned by the previous call is given back to its slot and
    /// the slot starts fetching the next undispatched chunk. Returns
    /// `Ok(None)` once every chunk has been delivered; further calls keep
    /// returning `Ok(None)`. A failed fetch is returned here, by the call
    /// that awaits its slot, and leaves the downloader unusable.
    pub async fn next_chunk(&mut self) -> Result<Option<&ChunkBuffer>> {
        if self.poisoned {
            return Err(Error::InvalidState(
                "Chunk downloader is unusable after an earlier failure".to_string(),
            ));
        }

        debug!(
            "Next chunk to consume: {}, next chunk to download: {}",
            self.next_to_consume, self.next_to_download
        );

        if let Some(buffer) = self.take_lent() {
            if self.next_to_download < self.descriptors.len() {
                self.launch(buffer);
            } else {
                let slot = buffer.chunk_index() % self.slots.len();
                self.slots[slot] = Slot::Idle(buffer);
            }
        }

        if self.next_to_consume >= self.descriptors.len() {
            if !self.finished {
                self.finished = true;
                debug!("All {} chunks consumed", self.descriptors.len());
            }
            return Ok(None);
        }

        let chunk_index = self.next_to_consume;
        let slot = chunk_index % self.slots.len();

        let Slot::Pending(handle) = &mut self.slots[slot] else {
            self.poisoned = true;
            return Err(Error::InvalidState(format!(
                "No fetch pending for chunk {}",
                chunk_index
            )));
        };

        // Only suspension point for the consumer.
        let outcome = handle.await;

        let buffer = match outcome {
            Ok(Ok(buffer)) => buffer,
            Ok(Err(e)) => {
                error!("Chunk {} failed: {}", chunk_index, e);
                return Err(self.fail(slot, e));
            }
            Err(join_error) if join_error.is_cancelled() => {
                return Err(self.fail(slot, Error::Cancelled { chunk_index }));
            }
            Err(join_error) => {
                error!("Fetch task for chunk {} panicked: {}", chunk_index, join_error);
                return Err(self.fail(
                    slot,
                    Error::InvalidState(format!("Fetch task for chunk {} panicked", chunk_index)),
                ));
            }
        };

        trace!(
            "Handing chunk {} ({} rows) to consumer from slot {}",
            chunk_index,
            buffer.row_count(),
            slot
        );

        self.slots[slot] = Slot::Lent(buffer);
        self.lent = Some(slot);
        self.next_to_consume += 1;

        Ok(self.current())
    }

    fn fail(&mut self, slot: usize, error: Error) -> Error {
        self.slots[slot] = Slot::Lost;
        self.poisoned = true;
        error
    }

    fn take_lent(&mut self) -> Option<ChunkBuffer> {
        let slot = self.lent.take()?;
        match std::mem::replace(&mut self.slots[slot], Slot::Lost) {
            Slot::Lent(buffer) => Some(buffer),
            other => {
                self.slots[slot] = other;
                None
            }
        }
    }

    /// Reset `buffer` for the next undispatched chunk and start its fetch.
    fn launch(&mut self, mut buffer: ChunkBuffer) {
        let chunk_index = self.next_to_download;
        let slot = chunk_index % self.slots.len();
        buffer.reset(&self.descriptors[chunk_index]);

        let task = FetchTask {
            descriptors: Arc::clone(&self.descriptors),
            chunk_index,
            qrmk: self.qrmk.clone(),
            fetcher: Arc::clone(&self.fetcher),
            diagnostics: Arc::clone(&self.diagnostics),
            cancel_token: self.cancel_token.clone(),
            fetch_timeout: self.fetch_timeout,
            speed_threshold_mbps: self.speed_threshold_mbps,
        };

        debug!("Scheduling download for chunk {} in slot {}", chunk_index, slot);

        self.slots[slot] = Slot::Pending(self.runtime_handle.spawn(task.run(buffer)));
        self.next_to_download += 1;
    }
}

impl Drop for ChunkDownloader {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        for slot in &self.slots {
            if let Slot::Pending(handle) = slot {
                handle.abort();
            }
        }
    }
}

/// Fetch and parse of a single chunk.
struct FetchTask {
    descriptors: Arc<[ChunkDescriptor]>,
    chunk_index: usize,
    qrmk: Option<Arc<str>>,
    fetcher: Arc<dyn ChunkFetcher>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    cancel_token: CancellationToken,
    fetch_timeout: Duration,
    speed_threshold_mbps: f64,
}

impl FetchTask {
    async fn run(self, mut buffer: ChunkBuffer) -> Result<ChunkBuffer> {
        let chunk_index = self.chunk_index;
        let descriptor = &self.descriptors[chunk_index];
        let begin = Utc::now();
        let start = Instant::now();

        debug!("Start downloading chunk {}", chunk_index);

        let fetch = self
            .fetcher
            .fetch_chunk(descriptor, self.qrmk.as_deref(), &self.cancel_token);

        let body = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                return Err(Error::Cancelled { chunk_index });
            }
            outcome = tokio::time::timeout(self.fetch_timeout, fetch) => match outcome {
                Ok(result) => result.map_err(|e| e.for_chunk(chunk_index))?,
                Err(_) => {
                    return Err(Error::Timeout {
                        chunk_index,
                        timeout: self.fetch_timeout,
                    });
                }
            },
        };

        let elapsed = start.elapsed();
        let size_mb = body.len() as f64 / 1024.0 / 1024.0;
        let speed_mbps = size_mb / elapsed.as_secs_f64().max(f64::EPSILON);

        debug!(
            "Downloaded chunk {}: {:.2} MB in {:.2}s ({:.2} MB/s)",
            chunk_index,
            size_mb,
            elapsed.as_secs_f64(),
            speed_mbps
        );

        if speed_mbps < self.speed_threshold_mbps {
            warn!(
                "Chunk download slower than threshold: {:.2} MB/s (threshold: {:.2} MB/s)",
                speed_mbps, self.speed_threshold_mbps
            );
        }

        parse_chunk(&body[..], &mut buffer).map_err(|e| e.for_chunk(chunk_index))?;

        if buffer.parsed_row_count() != descriptor.row_count || !buffer.is_row_aligned() {
            warn!(
                "Chunk {} parsed into {} cells, expected {} rows of {} columns",
                chunk_index,
                buffer.cell_count(),
                descriptor.row_count,
                buffer.column_count()
            );
        }

        debug!(
            "Succeeded downloading chunk {} in {} ms, {} rows",
            chunk_index,
            start.elapsed().as_millis(),
            buffer.row_count()
        );

        self.diagnostics.record_download(DownloadStatistic {
            chunk_index,
            begin,
            end: Utc::now(),
            row_count: buffer.row_count(),
            byte_count: body.len(),
        });

        Ok(buffer)
    }
}
