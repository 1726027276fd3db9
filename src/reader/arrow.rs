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

//! Arrow view of a result set.
//!
//! Cells stay opaque text, so every column is exposed as nullable `Utf8`.
//! Typed Arrow conversion is left to the consumer.

use crate::convert::CellConverter;
use crate::error::{Error, Result};
use crate::reader::chunk_buffer::{Cell, ChunkBuffer};
use crate::reader::cursor::{BlockingResultSet, CursorState};
use crate::types::response::ColumnMeta;
use arrow_array::builder::StringBuilder;
use arrow_array::{ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use std::sync::Arc;

/// Arrow schema for `columns`.
pub fn schema_for(columns: &[ColumnMeta]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|column| Field::new(&column.name, DataType::Utf8, true))
        .collect();
    Arc::new(Schema::new(fields))
}

impl ChunkBuffer {
    /// Build a record batch from the announced rows of this chunk.
    pub fn to_record_batch(&self, columns: &[ColumnMeta]) -> Result<RecordBatch> {
        self.to_record_batch_with_schema(&schema_for(columns))
    }

    pub(crate) fn to_record_batch_with_schema(&self, schema: &SchemaRef) -> Result<RecordBatch> {
        if schema.fields().len() != self.column_count() {
            return Err(Error::InvalidState(format!(
                "Schema has {} fields but chunk {} has {} columns",
                schema.fields().len(),
                self.chunk_index(),
                self.column_count()
            )));
        }

        let rows = self.row_count();
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.column_count());
        for column in 0..self.column_count() {
            let mut builder = StringBuilder::with_capacity(rows, 0);
            for row in 0..rows {
                match self.extract_cell(row, column)? {
                    Cell::Null => builder.append_null(),
                    Cell::Bytes(bytes) => {
                        let text = std::str::from_utf8(bytes).map_err(|e| Error::Conversion {
                            column,
                            target: "utf8",
                            message: e.to_string(),
                        })?;
                        builder.append_value(text);
                    }
                }
            }
            arrays.push(Arc::new(builder.finish()));
        }

        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(schema),
            arrays,
            &options,
        )?)
    }
}

/// Reads a result set as one record batch per non-empty chunk.
#[derive(Debug)]
pub struct ChunkBatchReader<C: CellConverter> {
    cursor: BlockingResultSet<C>,
    schema: SchemaRef,
    done: bool,
}

impl<C: CellConverter> BlockingResultSet<C> {
    /// Turn the cursor into an Arrow batch reader.
    ///
    /// Only allowed before the first row has been read.
    pub fn into_batch_reader(self) -> Result<ChunkBatchReader<C>> {
        if self.state() != CursorState::BeforeFirstRow {
            return Err(Error::InvalidState(format!(
                "Cannot read batches from a result set in state {:?}",
                self.state()
            )));
        }
        let schema = schema_for(self.columns());
        Ok(ChunkBatchReader {
            cursor: self,
            schema,
            done: false,
        })
    }
}

impl<C: CellConverter> ChunkBatchReader<C> {
    fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        while let Some(chunk) = self.cursor.next_chunk()? {
            if chunk.row_count() > 0 {
                return chunk.to_record_batch_with_schema(&self.schema).map(Some);
            }
        }
        Ok(None)
    }
}

impl<C: CellConverter> arrow_array::RecordBatchReader for ChunkBatchReader<C> {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }
}

impl<C: CellConverter> Iterator for ChunkBatchReader<C> {
    type Item = std::result::Result<RecordBatch, ArrowError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(ArrowError::ExternalError(Box::new(e))))
            }
        }
    }
}
