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

//! Chunk fetch collaborator.
//!
//! This module provides:
//! - `ChunkFetcher` trait: fetch one chunk's raw payload for a descriptor
//! - `ChunkHttpClient`: reqwest-backed implementation for presigned object store URLs

pub mod http;

use crate::error::Result;
use crate::types::chunk::ChunkDescriptor;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

pub use http::{ChunkHttpClient, HttpClientConfig};

/// Fetches the raw payload of a chunk.
///
/// Implementations own transport concerns such as retries. They should
/// return promptly once `cancel` fires; the downloader also races the fetch
/// against the token, so a fetcher that ignores it is still cut short.
#[async_trait]
pub trait ChunkFetcher: Send + Sync + std::fmt::Debug {
    /// Fetch the payload of `descriptor`, authorizing with the query result
    /// master key when the descriptor carries no headers of its own.
    async fn fetch_chunk(
        &self,
        descriptor: &ChunkDescriptor,
        qrmk: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Bytes>;
}
