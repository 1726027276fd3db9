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

//! Chunk descriptors.
//!
//! A descriptor is created once per remote chunk when the query response is
//! decoded and is read-only afterwards. Its `chunk_index` defines the global
//! order of rows across chunks.

use std::collections::HashMap;

/// Server-side encryption algorithm header sent with the query result master key.
pub const SSE_C_ALGORITHM_HEADER: &str = "x-amz-server-side-encryption-customer-algorithm";

/// Server-side encryption key header carrying the query result master key.
pub const SSE_C_KEY_HEADER: &str = "x-amz-server-side-encryption-customer-key";

/// Algorithm value paired with [`SSE_C_KEY_HEADER`].
pub const SSE_C_AES: &str = "AES256";

/// Location and size of one remotely stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Ordinal of this chunk among the remote chunks (0-based).
    pub chunk_index: usize,
    /// Presigned URL of the chunk payload.
    pub url: String,
    /// Number of rows the chunk holds.
    pub row_count: usize,
    /// Size of the decoded payload in bytes, used to presize the cell arena.
    pub uncompressed_size: usize,
    /// Size of the payload on the wire.
    pub compressed_size: usize,
    /// Headers to send with the download request. Empty when the
    /// query result master key should be sent instead.
    pub http_headers: HashMap<String, String>,
}

impl ChunkDescriptor {
    /// Headers for the download request.
    ///
    /// Explicit chunk headers win. Without them, a `qrmk` is sent as an
    /// SSE-C key so the object store can decrypt the payload.
    pub fn request_headers(&self, qrmk: Option<&str>) -> Vec<(String, String)> {
        if !self.http_headers.is_empty() {
            return self
                .http_headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }

        match qrmk {
            Some(key) => vec![
                (SSE_C_ALGORITHM_HEADER.to_string(), SSE_C_AES.to_string()),
                (SSE_C_KEY_HEADER.to_string(), key.to_string()),
            ],
            None => Vec::new(),
        }
    }
}
