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

//! Reusable cell storage for one chunk.
//!
//! A `ChunkBuffer` owns a byte arena and, for each cell in row-major order,
//! a span into that arena or a null marker. Buffers are allocated once per
//! ring slot and reset for every chunk assigned to the slot, so the arena
//! and span vectors keep their capacity across chunks.

use crate::error::{Error, Result};
use crate::types::chunk::ChunkDescriptor;
use std::fmt;

/// Marker stored in `CellSpan::start` for a null cell.
const NULL_MARKER: usize = usize::MAX;

#[derive(Debug, Clone, Copy)]
struct CellSpan {
    start: usize,
    end: usize,
}

impl CellSpan {
    const NULL: CellSpan = CellSpan {
        start: NULL_MARKER,
        end: NULL_MARKER,
    };
}

/// A single cell borrowed from a chunk's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell<'a> {
    Null,
    Bytes(&'a [u8]),
}

impl<'a> Cell<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Cell::Null => None,
            Cell::Bytes(bytes) => Some(bytes),
        }
    }

    /// View the cell as UTF-8 text. `None` for null cells.
    pub fn as_str(&self) -> std::result::Result<Option<&'a str>, std::str::Utf8Error> {
        self.as_bytes().map(std::str::from_utf8).transpose()
    }
}

/// Cell storage for one chunk's worth of rows.
pub struct ChunkBuffer {
    column_count: usize,
    row_count: usize,
    chunk_index: usize,
    data: Vec<u8>,
    cells: Vec<CellSpan>,
}

impl fmt::Debug for ChunkBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkBuffer")
            .field("chunk_index", &self.chunk_index)
            .field("row_count", &self.row_count)
            .field("column_count", &self.column_count)
            .field("cells", &self.cells.len())
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl ChunkBuffer {
    /// Create an empty buffer for rows of `column_count` cells.
    pub fn new(column_count: usize) -> Self {
        Self {
            column_count,
            row_count: 0,
            chunk_index: 0,
            data: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Prepare the buffer for the chunk described by `descriptor`.
    ///
    /// Previous contents are discarded. Capacity is kept and only grown when
    /// the descriptor's size hints exceed it.
    pub fn reset(&mut self, descriptor: &ChunkDescriptor) {
        self.reset_for(descriptor.chunk_index, descriptor.row_count);
        self.data.reserve(descriptor.uncompressed_size);
        self.cells
            .reserve(descriptor.row_count.saturating_mul(self.column_count));
    }

    /// Reset to hold `row_count` rows of chunk `chunk_index`.
    pub(crate) fn reset_for(&mut self, chunk_index: usize, row_count: usize) {
        self.data.clear();
        self.cells.clear();
        self.chunk_index = chunk_index;
        self.row_count = row_count;
    }

    /// Append the next cell in row-major order.
    pub fn add_cell(&mut self, value: Option<&[u8]>) {
        match value {
            Some(bytes) => {
                let start = self.data.len();
                self.data.extend_from_slice(bytes);
                self.cells.push(CellSpan {
                    start,
                    end: self.data.len(),
                });
            }
            None => self.cells.push(CellSpan::NULL),
        }
    }

    /// Append a null cell.
    #[inline]
    pub(crate) fn add_null(&mut self) {
        self.cells.push(CellSpan::NULL);
    }

    /// Start a string cell written byte by byte. Returns the arena offset
    /// to pass to [`finish_cell`](Self::finish_cell) or
    /// [`abandon_cell`](Self::abandon_cell).
    #[inline]
    pub(crate) fn begin_cell(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub(crate) fn push_byte(&mut self, byte: u8) {
        self.data.push(byte);
    }

    #[inline]
    pub(crate) fn finish_cell(&mut self, start: usize) {
        self.cells.push(CellSpan {
            start,
            end: self.data.len(),
        });
    }

    /// Drop the bytes of a cell that was never finished.
    pub(crate) fn abandon_cell(&mut self, start: usize) {
        self.data.truncate(start);
    }

    /// Return the cell at (`row`, `column`).
    pub fn extract_cell(&self, row: usize, column: usize) -> Result<Cell<'_>> {
        let out_of_range = || Error::CellOutOfRange {
            chunk_index: self.chunk_index,
            row,
            column,
        };

        if column >= self.column_count {
            return Err(out_of_range());
        }
        let span = row
            .checked_mul(self.column_count)
            .and_then(|base| base.checked_add(column))
            .and_then(|index| self.cells.get(index))
            .ok_or_else(out_of_range)?;

        if span.start == NULL_MARKER {
            Ok(Cell::Null)
        } else {
            Ok(Cell::Bytes(&self.data[span.start..span.end]))
        }
    }

    /// Number of rows announced for the current chunk.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of complete rows actually stored.
    pub fn parsed_row_count(&self) -> usize {
        if self.column_count == 0 {
            0
        } else {
            self.cells.len() / self.column_count
        }
    }

    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// Number of cells stored so far.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Whether the stored cells end on a row boundary.
    pub fn is_row_aligned(&self) -> bool {
        self.column_count == 0 || self.cells.len() % self.column_count == 0
    }

    /// Bytes held in the arena.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}
