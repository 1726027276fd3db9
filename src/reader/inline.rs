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

//! Inline first chunk.
//!
//! The query response may carry the first rows of the result directly in its
//! `rowset`. Those rows are loaded into a [`ChunkBuffer`] once and served
//! before any remote chunk, without going through the downloader.

use crate::reader::chunk_buffer::ChunkBuffer;
use tracing::{debug, warn};

/// Load an inline rowset into a new chunk buffer of `column_count` columns.
///
/// Short rows are padded with nulls and extra cells are dropped, so the
/// buffer is always row aligned.
pub fn load_rowset(rows: &[Vec<Option<String>>], column_count: usize) -> ChunkBuffer {
    let mut buffer = ChunkBuffer::new(column_count);
    buffer.reset_for(0, rows.len());

    for (row_index, row) in rows.iter().enumerate() {
        if row.len() != column_count {
            warn!(
                "Inline row {} has {} cells, expected {}",
                row_index,
                row.len(),
                column_count
            );
        }
        for column in 0..column_count {
            let cell = row.get(column).and_then(|value| value.as_deref());
            buffer.add_cell(cell.map(str::as_bytes));
        }
    }

    debug!(
        "Loaded inline rowset: {} rows, {} bytes",
        buffer.row_count(),
        buffer.data_len()
    );

    buffer
}
