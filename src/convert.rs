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

//! Cell conversion.
//!
//! The cursor never interprets cell bytes itself. Every typed accessor goes
//! through a [`CellConverter`], which receives the raw cell, the declared
//! column metadata and the representation the caller asked for.

use crate::error::{Error, Result};
use crate::reader::chunk_buffer::Cell;
use crate::types::response::{ColumnMeta, ColumnType};

/// Representation requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Let the converter pick based on the declared column type.
    Native,
    Text,
    Int64,
    Float64,
    Boolean,
    Binary,
}

/// A converted cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int64(i64),
    Float64(f64),
    Boolean(bool),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Converts raw cells into values.
pub trait CellConverter: Send + Sync {
    /// Convert the cell of column `column_index`, declared as `column`, into
    /// the `target` representation.
    fn convert(
        &self,
        cell: Cell<'_>,
        column_index: usize,
        column: &ColumnMeta,
        target: Representation,
    ) -> Result<Value>;
}

/// Default converter for the textual wire format.
///
/// Cells are UTF-8 text. `BOOLEAN` cells accept `1`, `0`, `true` and `false`
/// in any case. `BINARY` cells are hex encoded. For [`Representation::Native`]
/// a `FIXED` column with zero scale becomes `Int64` when it fits, `REAL`
/// becomes `Float64`, and types without a natural scalar mapping stay `Text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter;

impl CellConverter for TextConverter {
    fn convert(
        &self,
        cell: Cell<'_>,
        column_index: usize,
        column: &ColumnMeta,
        target: Representation,
    ) -> Result<Value> {
        let Some(bytes) = cell.as_bytes() else {
            return Ok(Value::Null);
        };

        let fail = |target: &'static str, message: String| Error::Conversion {
            column: column_index,
            target,
            message,
        };
        let text = || std::str::from_utf8(bytes).map_err(|e| fail("text", e.to_string()));

        match target {
            Representation::Native => match column.column_type {
                ColumnType::Fixed if column.scale.unwrap_or(0) == 0 => {
                    let text = text()?;
                    Ok(text
                        .parse::<i64>()
                        .map(Value::Int64)
                        .unwrap_or_else(|_| Value::Text(text.to_string())))
                }
                ColumnType::Real => {
                    self.convert(cell, column_index, column, Representation::Float64)
                }
                ColumnType::Boolean => {
                    self.convert(cell, column_index, column, Representation::Boolean)
                }
                ColumnType::Binary => {
                    self.convert(cell, column_index, column, Representation::Binary)
                }
                _ => self.convert(cell, column_index, column, Representation::Text),
            },
            Representation::Text => Ok(Value::Text(text()?.to_string())),
            Representation::Int64 => text()?
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| fail("i64", e.to_string())),
            Representation::Float64 => {
                let text = text()?;
                text.trim()
                    .parse::<f64>()
                    .map(Value::Float64)
                    .map_err(|e| fail("f64", e.to_string()))
            }
            Representation::Boolean => {
                let text = text()?;
                parse_bool(text)
                    .map(Value::Boolean)
                    .ok_or_else(|| fail("bool", format!("invalid boolean literal {:?}", text)))
            }
            Representation::Binary => {
                if column.column_type == ColumnType::Binary {
                    hex::decode(bytes)
                        .map(Value::Binary)
                        .map_err(|e| fail("binary", e.to_string()))
                } else {
                    Ok(Value::Binary(bytes.to_vec()))
                }
            }
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "1" => Some(true),
        "0" => Some(false),
        t if t.eq_ignore_ascii_case("true") => Some(true),
        t if t.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}
