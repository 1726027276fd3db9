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

//! Streaming parser for chunk payloads.
//!
//! A chunk body is a sequence of row arrays without enclosing brackets:
//!
//! ```text
//! ["1","alpha",null],
//! ["2",null,"line\nbreak"],
//! ```
//!
//! Only string and null cells occur, so the parser is a two-state byte
//! automaton rather than a JSON parser:
//!
//! - outside a string, `"` opens a string cell and `n` emits a null cell;
//!   every other byte (brackets, commas, whitespace) is skipped
//! - inside a string, `"` closes the cell, `\` escapes the next byte
//!   (`n`, `r` and `b` map to LF, CR and backspace, anything else is kept
//!   as is) and every other byte is copied
//!
//! The `n` rule does not check that `ull` follows, and there is no support
//! for `\uXXXX` or `\t`: `\t` decodes to `t`. An unescaped `"` always ends
//! the string. The parser never reports malformed input; bad payloads give
//! wrong cell boundaries instead. A string still open at end of input is
//! dropped.

use crate::error::Result;
use crate::reader::chunk_buffer::ChunkBuffer;
use std::io::{ErrorKind, Read};

/// Size of the read-ahead buffer.
pub const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Byte reader with a fixed read-ahead buffer and an inlined fast path.
pub struct FastReader<R> {
    inner: R,
    buffer: Box<[u8; READ_BUFFER_SIZE]>,
    next: usize,
    count: usize,
    eof: bool,
}

impl<R: Read> FastReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Box::new([0; READ_BUFFER_SIZE]),
            next: 0,
            count: 0,
            eof: false,
        }
    }

    /// Read one byte, or `None` at end of input.
    #[inline(always)]
    pub fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        if self.next < self.count {
            let byte = self.buffer[self.next];
            self.next += 1;
            return Ok(Some(byte));
        }
        self.read_byte_slow()
    }

    #[cold]
    #[inline(never)]
    fn read_byte_slow(&mut self) -> std::io::Result<Option<u8>> {
        if self.eof {
            return Ok(None);
        }

        loop {
            match self.inner.read(&mut self.buffer[..]) {
                Ok(0) => {
                    self.eof = true;
                    self.next = 0;
                    self.count = 0;
                    return Ok(None);
                }
                Ok(n) => {
                    self.count = n;
                    self.next = 1;
                    return Ok(Some(self.buffer[0]));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Decode a chunk payload from `source` into `chunk`.
///
/// Cells are appended after whatever `chunk` already holds, so callers
/// reset the buffer first. The only possible error is an I/O error from
/// `source` itself.
pub fn parse_chunk<R: Read>(source: R, chunk: &mut ChunkBuffer) -> Result<()> {
    let mut input = FastReader::new(source);

    while let Some(byte) = input.read_byte()? {
        match byte {
            b'"' => {
                if !read_string_cell(&mut input, chunk)? {
                    break;
                }
            }
            b'n' => chunk.add_null(),
            _ => {}
        }
    }

    Ok(())
}

/// Copy one string cell into the arena. Returns `false` if input ended
/// before the closing quote.
#[inline]
fn read_string_cell<R: Read>(input: &mut FastReader<R>, chunk: &mut ChunkBuffer) -> Result<bool> {
    let start = chunk.begin_cell();

    loop {
        let Some(byte) = input.read_byte()? else {
            chunk.abandon_cell(start);
            return Ok(false);
        };

        match byte {
            b'"' => {
                chunk.finish_cell(start);
                return Ok(true);
            }
            b'\\' => {
                let Some(escaped) = input.read_byte()? else {
                    chunk.abandon_cell(start);
                    return Ok(false);
                };
                chunk.push_byte(unescape(escaped));
            }
            other => chunk.push_byte(other),
        }
    }
}

#[inline(always)]
fn unescape(byte: u8) -> u8 {
    match byte {
        b'n' => b'\n',
        b'r' => b'\r',
        b'b' => 0x08,
        other => other,
    }
}
