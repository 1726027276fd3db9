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

//! End-to-end tests for result streaming with a mock chunk fetcher.

use async_trait::async_trait;
use bytes::Bytes;
use snowflake_resultset::diagnostics::{DownloadStatistic, WaitStatistic};
use snowflake_resultset::types::response::ChunkInfo;
use snowflake_resultset::{
    Cell, CellConverter, ChunkDescriptor, ChunkFetcher, ColumnMeta, ColumnType, CursorState,
    DiagnosticsSink, Error, QueryResultData, Representation, Result, ResultSetConfig,
    ResultSetFactory, TimelineRecorder, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INLINE_ROWS: usize = 3;
const ROWS_PER_CHUNK: usize = 4;

/// Serves chunk payloads whose IDs continue the inline rowset.
#[derive(Debug, Default)]
struct MockFetcher {
    delays_ms: HashMap<usize, u64>,
    fail_chunk: Option<usize>,
    empty_chunks: Vec<usize>,
    fetch_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFetcher {
    fn with_delays(delays: &[(usize, u64)]) -> Self {
        Self {
            delays_ms: delays.iter().copied().collect(),
            ..Default::default()
        }
    }
}

fn first_id(chunk_index: usize) -> usize {
    INLINE_ROWS + chunk_index * ROWS_PER_CHUNK
}

fn payload(chunk_index: usize) -> Bytes {
    let body: String = (0..ROWS_PER_CHUNK)
        .map(|row| {
            let id = first_id(chunk_index) + row;
            if row == 1 {
                format!("[\"{}\",null],\n", id)
            } else {
                format!("[\"{}\",\"name\\n{}\"],\n", id, id)
            }
        })
        .collect();
    Bytes::from(body)
}

#[async_trait]
impl ChunkFetcher for MockFetcher {
    async fn fetch_chunk(
        &self,
        descriptor: &ChunkDescriptor,
        qrmk: Option<&str>,
        _cancel: &CancellationToken,
    ) -> Result<Bytes> {
        assert_eq!(qrmk, Some("bWFzdGVyLWtleQ=="));
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(ms) = self.delays_ms.get(&descriptor.chunk_index) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_chunk == Some(descriptor.chunk_index) {
            return Err(Error::Http {
                status: 503,
                body: "Service Unavailable".to_string(),
            });
        }
        if self.empty_chunks.contains(&descriptor.chunk_index) {
            return Ok(Bytes::new());
        }
        Ok(payload(descriptor.chunk_index))
    }
}

fn create_query_result(chunks: usize, empty_chunks: &[usize]) -> QueryResultData {
    let row_set = (0..INLINE_ROWS)
        .map(|id| vec![Some(id.to_string()), Some(format!("name\n{}", id))])
        .collect();
    let chunks = (0..chunks)
        .map(|i| ChunkInfo {
            url: format!("https://stage.example.com/results/data_0_0_{}", i),
            row_count: if empty_chunks.contains(&i) {
                0
            } else {
                ROWS_PER_CHUNK
            },
            uncompressed_size: 128,
            compressed_size: 64,
        })
        .collect();

    QueryResultData {
        query_id: Some("01b2c3d4-0000-1111-0000-000000000001".to_string()),
        row_type: vec![
            ColumnMeta::new("ID", ColumnType::Fixed),
            ColumnMeta::new("NAME", ColumnType::Text),
        ],
        row_set,
        chunks: Some(chunks),
        qrmk: Some("bWFzdGVyLWtleQ==".to_string()),
        chunk_headers: None,
        total: None,
        returned: None,
    }
}

fn create_factory(fetcher: Arc<MockFetcher>, prefetch_threads: usize) -> ResultSetFactory {
    let config = ResultSetConfig {
        prefetch_threads,
        ..Default::default()
    };
    ResultSetFactory::new(fetcher, config, tokio::runtime::Handle::current())
}

fn total_rows(chunks: usize) -> usize {
    INLINE_ROWS + chunks * ROWS_PER_CHUNK
}

#[tokio::test]
async fn test_rows_arrive_in_order_when_chunks_complete_out_of_order() {
    let fetcher = Arc::new(MockFetcher::with_delays(&[
        (0, 80),
        (1, 40),
        (2, 0),
        (3, 20),
    ]));
    let factory = create_factory(fetcher.clone(), 3);
    let data = create_query_result(6, &[]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    let mut ids = Vec::new();
    while rs.next().await.unwrap() {
        let id = rs.get_i64(0).unwrap().unwrap() as usize;
        match rs.get_str(1).unwrap() {
            Some(name) => assert_eq!(name, format!("name\n{}", id)),
            None => assert_eq!((id - INLINE_ROWS) % ROWS_PER_CHUNK, 1),
        }
        ids.push(id);
    }

    assert_eq!(ids, (0..total_rows(6)).collect::<Vec<_>>());
    assert_eq!(fetcher.fetch_count.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_exhaustion_is_idempotent() {
    let factory = create_factory(Arc::new(MockFetcher::default()), 2);
    let data = create_query_result(2, &[]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    for _ in 0..total_rows(2) {
        assert!(rs.next().await.unwrap());
    }
    for _ in 0..3 {
        assert!(!rs.next().await.unwrap());
    }
    assert_eq!(rs.state(), CursorState::Exhausted);
    assert_eq!(rs.rows_returned(), total_rows(2) as u64);
}

#[tokio::test]
async fn test_in_flight_fetches_never_exceed_prefetch_threads() {
    let delays: Vec<(usize, u64)> = (0..10).map(|i| (i, 5)).collect();
    let fetcher = Arc::new(MockFetcher::with_delays(&delays));
    let factory = create_factory(fetcher.clone(), 3);
    let data = create_query_result(10, &[]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    let mut rows = 0;
    while rs.next().await.unwrap() {
        rows += 1;
    }

    assert_eq!(rows, total_rows(10));
    assert_eq!(fetcher.fetch_count.load(Ordering::SeqCst), 10);
    assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_single_prefetch_thread_streams_everything() {
    let factory = create_factory(Arc::new(MockFetcher::default()), 1);
    let data = create_query_result(5, &[]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    let mut last = None;
    while rs.next().await.unwrap() {
        let id = rs.get_i64(0).unwrap().unwrap();
        if let Some(prev) = last {
            assert_eq!(id, prev + 1);
        }
        last = Some(id);
    }
    assert_eq!(last, Some(total_rows(5) as i64 - 1));
}

#[tokio::test]
async fn test_zero_row_chunks_are_skipped() {
    let fetcher = Arc::new(MockFetcher {
        empty_chunks: vec![1],
        ..Default::default()
    });
    let factory = create_factory(fetcher, 2);
    let data = create_query_result(3, &[1]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    let mut ids = Vec::new();
    while rs.next().await.unwrap() {
        ids.push(rs.get_i64(0).unwrap().unwrap() as usize);
    }

    let expected: Vec<usize> = (0..first_id(1))
        .chain(first_id(2)..first_id(3))
        .collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_fetch_failure_surfaces_with_chunk_index() {
    let fetcher = Arc::new(MockFetcher {
        fail_chunk: Some(2),
        ..Default::default()
    });
    let factory = create_factory(fetcher, 2);
    let data = create_query_result(4, &[]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    let mut rows = 0;
    let err = loop {
        match rs.next().await {
            Ok(true) => rows += 1,
            Ok(false) => panic!("result set ended without surfacing the failure"),
            Err(e) => break e,
        }
    };

    assert_eq!(rows, first_id(2));
    assert_eq!(err.chunk_index(), Some(2));
    assert!(err.is_transient());
    assert!(!err.is_cancelled());

    // no recovery afterwards
    assert!(rs.next().await.is_err());
}

#[tokio::test]
async fn test_cancellation_surfaces_at_next_consume_point() {
    let fetcher = Arc::new(MockFetcher::with_delays(&[(1, 10_000)]));
    let factory = create_factory(fetcher, 2);
    let data = create_query_result(3, &[]);
    let cancel = CancellationToken::new();
    let mut rs = factory.create(&data, &cancel).unwrap();

    for _ in 0..first_id(1) {
        assert!(rs.next().await.unwrap());
    }
    // rows already delivered stay readable
    assert_eq!(rs.get_i64(0).unwrap(), Some(first_id(1) as i64 - 1));

    cancel.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), rs.next())
        .await
        .expect("cancellation should interrupt the wait")
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.chunk_index(), Some(1));
}

#[tokio::test]
async fn test_closed_cursor_rejects_every_column() {
    let factory = create_factory(Arc::new(MockFetcher::default()), 2);
    let data = create_query_result(2, &[]);
    let mut rs = factory.create(&data, &CancellationToken::new()).unwrap();

    assert!(rs.next().await.unwrap());
    assert!(rs.get_cell(0).is_ok());
    rs.close();

    for column in 0..=rs.column_count() {
        assert!(matches!(rs.get_cell(column), Err(Error::Closed)));
        assert!(matches!(rs.get_i64(column), Err(Error::Closed)));
    }
    assert!(matches!(rs.next().await, Err(Error::Closed)));
    assert_eq!(rs.state(), CursorState::Closed);
}

#[tokio::test]
async fn test_timeline_recorder_sees_every_download_and_wait() {
    let fetcher = Arc::new(MockFetcher::with_delays(&[(0, 10), (1, 10), (2, 10)]));
    let factory = create_factory(fetcher, 2);
    let data = create_query_result(3, &[]);
    let recorder = Arc::new(TimelineRecorder::new());
    let mut rs = factory
        .create_with_diagnostics(
            &data,
            &CancellationToken::new(),
            snowflake_resultset::TextConverter,
            recorder.clone(),
        )
        .unwrap();

    while rs.next().await.unwrap() {}

    let downloads = recorder.downloads();
    assert_eq!(
        downloads.iter().map(|d| d.chunk_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(downloads.iter().all(|d| d.row_count == ROWS_PER_CHUNK));
    // one wait per remote chunk plus the end-of-chunks check
    assert_eq!(recorder.waits().len(), 4);

    let lines = recorder.render(chrono::Utc::now());
    assert!(lines[1].starts_with("Elapsed time = "));
    assert!(lines.iter().any(|l| l.contains("#2 ")));
}

/// Captures what a timeline sink holds at the moment `finish` is called.
#[derive(Debug, Default)]
struct SnapshotSink {
    recorder: TimelineRecorder,
    finish_calls: AtomicUsize,
    waits_at_finish: AtomicUsize,
    downloads_at_finish: AtomicUsize,
}

impl DiagnosticsSink for SnapshotSink {
    fn record_download(&self, stat: DownloadStatistic) {
        self.recorder.record_download(stat);
    }

    fn record_wait(&self, stat: WaitStatistic) {
        self.recorder.record_wait(stat);
    }

    fn finish(&self) {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        self.waits_at_finish
            .store(self.recorder.waits().len(), Ordering::SeqCst);
        self.downloads_at_finish
            .store(self.recorder.downloads().len(), Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_timeline_is_finished_after_the_last_wait() {
    let factory = create_factory(Arc::new(MockFetcher::default()), 2);
    let data = create_query_result(3, &[]);
    let sink = Arc::new(SnapshotSink::default());
    let mut rs = factory
        .create_with_diagnostics(
            &data,
            &CancellationToken::new(),
            snowflake_resultset::TextConverter,
            sink.clone(),
        )
        .unwrap();

    while rs.next().await.unwrap() {}
    assert!(!rs.next().await.unwrap());

    assert_eq!(sink.finish_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.downloads_at_finish.load(Ordering::SeqCst), 3);
    // three chunk waits plus the one that found the end
    assert_eq!(sink.waits_at_finish.load(Ordering::SeqCst), 4);
}

/// Upper-cases every text cell.
struct ShoutingConverter;

impl CellConverter for ShoutingConverter {
    fn convert(
        &self,
        cell: Cell<'_>,
        _column_index: usize,
        _column: &ColumnMeta,
        _target: Representation,
    ) -> Result<Value> {
        Ok(match cell {
            Cell::Null => Value::Null,
            Cell::Bytes(bytes) => Value::Text(String::from_utf8_lossy(bytes).to_uppercase()),
        })
    }
}

#[tokio::test]
async fn test_custom_converter_is_used_for_values() {
    let factory = create_factory(Arc::new(MockFetcher::default()), 2);
    let data = create_query_result(1, &[]);
    let mut rs = factory
        .create_with_converter(&data, &CancellationToken::new(), ShoutingConverter)
        .unwrap();

    assert!(rs.next().await.unwrap());
    assert_eq!(
        rs.get_value(1, Representation::Native).unwrap(),
        Value::Text("NAME\n0".to_string())
    );
    // raw access bypasses the converter
    assert_eq!(rs.get_str(1).unwrap(), Some("name\n0"));
}

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_blocking_result_set_reads_all_rows() {
    let runtime = create_runtime();
    let fetcher = Arc::new(MockFetcher::with_delays(&[(0, 20), (2, 5)]));
    let factory = ResultSetFactory::new(
        fetcher,
        ResultSetConfig::default(),
        runtime.handle().clone(),
    );
    let data = create_query_result(4, &[]);
    let mut rs = factory
        .create_blocking(&data, &CancellationToken::new())
        .unwrap();

    let mut ids = Vec::new();
    while rs.next().unwrap() {
        ids.push(rs.get_i64(0).unwrap().unwrap() as usize);
    }
    assert_eq!(ids, (0..total_rows(4)).collect::<Vec<_>>());
    assert!(!rs.next().unwrap());
}

#[test]
fn test_batch_reader_yields_one_batch_per_chunk() {
    use arrow_array::{Array, RecordBatchReader, StringArray};

    let runtime = create_runtime();
    let factory = ResultSetFactory::new(
        Arc::new(MockFetcher::default()),
        ResultSetConfig::default(),
        runtime.handle().clone(),
    );
    let data = create_query_result(3, &[]);
    let reader = factory
        .create_blocking(&data, &CancellationToken::new())
        .unwrap()
        .into_batch_reader()
        .unwrap();

    assert_eq!(reader.schema().fields().len(), 2);
    let batches: Vec<_> = reader.collect::<std::result::Result<_, _>>().unwrap();
    assert_eq!(batches.len(), 4);
    assert_eq!(batches[0].num_rows(), INLINE_ROWS);
    assert!(batches[1..].iter().all(|b| b.num_rows() == ROWS_PER_CHUNK));

    let ids = batches[1]
        .column(0)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert_eq!(ids.value(0), first_id(0).to_string());
    let names = batches[1]
        .column(1)
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    assert!(names.is_null(1));
}

#[test]
fn test_batch_reader_requires_unread_cursor() {
    let runtime = create_runtime();
    let factory = ResultSetFactory::new(
        Arc::new(MockFetcher::default()),
        ResultSetConfig::default(),
        runtime.handle().clone(),
    );
    let data = create_query_result(1, &[]);
    let mut rs = factory
        .create_blocking(&data, &CancellationToken::new())
        .unwrap();

    assert!(rs.next().unwrap());
    assert!(matches!(rs.into_batch_reader(), Err(Error::InvalidState(_))));
}
