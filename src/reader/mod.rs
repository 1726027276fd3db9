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

//! Result readers for chunked query results.
//!
//! This module provides:
//! - `ResultSetFactory`: Builds a cursor from a query response
//! - `ChunkBuffer` and `parse_chunk`: Arena storage and decoder for one chunk
//! - `ChunkDownloader`: Bounded, ordered prefetch of remote chunks
//! - `ResultSet` / `BlockingResultSet`: Row cursors over inline and remote chunks
//! - `ChunkBatchReader`: Arrow `RecordBatchReader` view, one batch per chunk

pub mod arrow;
pub mod chunk_buffer;
pub mod cursor;
pub mod downloader;
pub mod inline;
pub mod parser;

use crate::client::ChunkFetcher;
use crate::convert::{CellConverter, TextConverter};
use crate::diagnostics::{DiagnosticsSink, NoopDiagnostics, TimelineRecorder};
use crate::error::{Error, Result};
use crate::logging::init_logging;
use crate::reader::cursor::{BlockingResultSet, ResultSet};
use crate::reader::downloader::{ChunkDownloader, RemoteChunks};
use crate::reader::inline::load_rowset;
use crate::types::config::ResultSetConfig;
use crate::types::response::QueryResultData;
use std::sync::Arc;
use tokio::runtime::RuntimeFlavor;
use tokio_util::sync::CancellationToken;

/// Factory that creates result set cursors from query responses.
///
/// Creating a factory initializes logging from `config.log`.
///
/// Results that fit entirely in the inline rowset get a cursor without a
/// downloader. Otherwise a [`ChunkDownloader`] is started right away, so the
/// first remote chunks are already in flight while the inline rows are read.
#[derive(Debug, Clone)]
pub struct ResultSetFactory {
    fetcher: Arc<dyn ChunkFetcher>,
    config: ResultSetConfig,
    runtime_handle: tokio::runtime::Handle,
}

impl ResultSetFactory {
    pub fn new(
        fetcher: Arc<dyn ChunkFetcher>,
        config: ResultSetConfig,
        runtime_handle: tokio::runtime::Handle,
    ) -> Self {
        init_logging(&config.log);
        Self {
            fetcher,
            config,
            runtime_handle,
        }
    }

    pub fn config(&self) -> &ResultSetConfig {
        &self.config
    }

    /// Create an async cursor with the default [`TextConverter`].
    pub fn create(&self, data: &QueryResultData, cancel: &CancellationToken) -> Result<ResultSet> {
        self.create_with_converter(data, cancel, TextConverter)
    }

    /// Create a blocking cursor with the default [`TextConverter`].
    ///
    /// Requires a multi-thread runtime: a current-thread runtime never runs
    /// the fetch tasks while another thread blocks on its handle.
    pub fn create_blocking(
        &self,
        data: &QueryResultData,
        cancel: &CancellationToken,
    ) -> Result<BlockingResultSet> {
        if self.runtime_handle.runtime_flavor() != RuntimeFlavor::MultiThread {
            return Err(Error::InvalidState(format!(
                "Blocking result sets need a multi-thread runtime, got {:?}",
                self.runtime_handle.runtime_flavor()
            )));
        }
        Ok(BlockingResultSet::new(
            self.create(data, cancel)?,
            self.runtime_handle.clone(),
        ))
    }

    /// Create an async cursor that converts cells with `converter`.
    pub fn create_with_converter<C: CellConverter>(
        &self,
        data: &QueryResultData,
        cancel: &CancellationToken,
        converter: C,
    ) -> Result<ResultSet<C>> {
        self.create_with_diagnostics(data, cancel, converter, self.default_diagnostics())
    }

    /// Create an async cursor reporting to an explicit diagnostics sink.
    pub fn create_with_diagnostics<C: CellConverter>(
        &self,
        data: &QueryResultData,
        cancel: &CancellationToken,
        converter: C,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<ResultSet<C>> {
        let column_count = data.column_count();
        let descriptors = data.chunk_descriptors();

        tracing::debug!(
            "Creating result set for query {:?}: {} columns, {} inline rows, {} remote chunks",
            data.query_id,
            column_count,
            data.row_set.len(),
            descriptors.len()
        );

        let inline = Some(load_rowset(&data.row_set, column_count));

        let downloader = if descriptors.is_empty() {
            None
        } else {
            Some(ChunkDownloader::new(
                RemoteChunks {
                    column_count,
                    descriptors,
                    qrmk: data.qrmk.clone(),
                },
                Arc::clone(&self.fetcher),
                &self.config,
                cancel,
                self.runtime_handle.clone(),
                Arc::clone(&diagnostics),
            ))
        };

        Ok(ResultSet::new(
            data.query_id.clone(),
            data.row_type.clone(),
            inline,
            downloader,
            converter,
            diagnostics,
        ))
    }

    fn default_diagnostics(&self) -> Arc<dyn DiagnosticsSink> {
        if self.config.timeline_logging {
            Arc::new(TimelineRecorder::new())
        } else {
            Arc::new(NoopDiagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chunk::ChunkDescriptor;
    use async_trait::async_trait;
    use bytes::Bytes;

    #[derive(Debug)]
    struct UnreachableFetcher;

    #[async_trait]
    impl ChunkFetcher for UnreachableFetcher {
        async fn fetch_chunk(
            &self,
            descriptor: &ChunkDescriptor,
            _qrmk: Option<&str>,
            _cancel: &CancellationToken,
        ) -> Result<Bytes> {
            Err(Error::InvalidState(format!(
                "unexpected fetch of chunk {}",
                descriptor.chunk_index
            )))
        }
    }

    #[tokio::test]
    async fn test_inline_only_response_never_fetches() {
        let data = QueryResultData::from_json(
            r#"{
                "rowtype": [{"name": "N", "type": "fixed", "scale": 0}],
                "rowset": [["1"], ["2"], ["3"]]
            }"#,
        )
        .unwrap();
        let factory = ResultSetFactory::new(
            Arc::new(UnreachableFetcher),
            ResultSetConfig::default(),
            tokio::runtime::Handle::current(),
        );

        let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();
        let mut sum = 0;
        while rs.next().await.unwrap() {
            sum += rs.get_i64(0).unwrap().unwrap();
        }
        assert_eq!(sum, 6);
    }

    #[tokio::test]
    async fn test_factory_surfaces_fetch_failure() {
        let data = QueryResultData::from_json(
            r#"{
                "rowtype": [{"name": "N", "type": "text"}],
                "rowset": [],
                "chunks": [{"url": "https://stage.example.com/c0", "rowCount": 1, "uncompressedSize": 8, "compressedSize": 8}]
            }"#,
        )
        .unwrap();
        let factory = ResultSetFactory::new(
            Arc::new(UnreachableFetcher),
            ResultSetConfig::default(),
            tokio::runtime::Handle::current(),
        );

        let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();
        let err = rs.next().await.unwrap_err();
        assert_eq!(err.chunk_index(), Some(0));
    }

    #[test]
    fn test_create_blocking_rejects_current_thread_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let data = QueryResultData::from_json(
            r#"{
                "rowtype": [{"name": "N", "type": "text"}],
                "rowset": [],
                "chunks": [{"url": "https://stage.example.com/c0", "rowCount": 1}]
            }"#,
        )
        .unwrap();
        let factory = ResultSetFactory::new(
            Arc::new(UnreachableFetcher),
            ResultSetConfig::default(),
            runtime.handle().clone(),
        );

        let err = factory
            .create_blocking(&data, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_create_blocking_accepts_multi_thread_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let data = QueryResultData::from_json(
            r#"{"rowtype": [{"name": "N", "type": "text"}], "rowset": [["a"]]}"#,
        )
        .unwrap();
        let factory = ResultSetFactory::new(
            Arc::new(UnreachableFetcher),
            ResultSetConfig::default(),
            runtime.handle().clone(),
        );

        let mut rs = factory
            .create_blocking(&data, &CancellationToken::new())
            .unwrap();
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_str(0).unwrap(), Some("a"));
        assert!(!rs.next().unwrap());
    }
}
