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

//! Download and wait diagnostics.
//!
//! The downloader reports each completed chunk fetch and the cursor reports
//! each time the consumer had to wait for a chunk. A [`DiagnosticsSink`] is
//! injected per result set; nothing here is process-global.
//!
//! [`TimelineRecorder`] keeps the intervals and, when the result set is
//! exhausted, logs a text timeline such as:
//!
//! ```text
//! Elapsed time = 840 ms, WaitTime = 310 ms, ParseTime= 530 ms
//! Each character is 5 ms
//! --0      --1           -2
//! ======== #0 41 ms 1000 rows
//!     ============ #1 63 ms 1000 rows
//! ```

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::info;

/// Width of the rendered timeline in characters.
pub const TIMELINE_WIDTH: usize = 160;

/// One completed chunk download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadStatistic {
    pub chunk_index: usize,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub row_count: usize,
    pub byte_count: usize,
}

/// One interval the consumer spent waiting for a chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitStatistic {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Receives diagnostics from a single result set.
pub trait DiagnosticsSink: Send + Sync + std::fmt::Debug {
    fn record_download(&self, stat: DownloadStatistic);

    fn record_wait(&self, stat: WaitStatistic);

    /// Called once when the consumer has read past the last chunk.
    fn finish(&self) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticsSink for NoopDiagnostics {
    fn record_download(&self, _stat: DownloadStatistic) {}

    fn record_wait(&self, _stat: WaitStatistic) {}
}

#[derive(Debug, Default)]
struct TimelineState {
    downloads: Vec<DownloadStatistic>,
    waits: Vec<WaitStatistic>,
}

/// Collects download and wait intervals and logs them as a timeline.
#[derive(Debug, Default)]
pub struct TimelineRecorder {
    state: Mutex<TimelineState>,
}

impl TimelineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Downloads recorded so far, ordered by chunk index.
    pub fn downloads(&self) -> Vec<DownloadStatistic> {
        let mut downloads = self
            .state
            .lock()
            .map(|s| s.downloads.clone())
            .unwrap_or_default();
        downloads.sort_by_key(|d| d.chunk_index);
        downloads
    }

    pub fn waits(&self) -> Vec<WaitStatistic> {
        self.state
            .lock()
            .map(|s| s.waits.clone())
            .unwrap_or_default()
    }

    /// Render the summary and timeline, measuring elapsed time up to `now`.
    pub fn render(&self, now: DateTime<Utc>) -> Vec<String> {
        let downloads = self.downloads();
        let waits = self.waits();

        let mut lines = vec!["Download finished".to_string()];
        let Some(first) = downloads.iter().map(|d| d.begin).min() else {
            return lines;
        };

        let elapsed_ms = millis_between(first, now);
        let wait_ms: f64 = waits.iter().map(|w| millis_between(w.begin, w.end)).sum();
        lines.push(format!(
            "Elapsed time = {:.0} ms, WaitTime = {:.0} ms, ParseTime= {:.0} ms",
            elapsed_ms,
            wait_ms,
            elapsed_ms - wait_ms
        ));

        let mut builder = TimelineBuilder::new(first, now, TIMELINE_WIDTH);
        lines.push(format!("Each character is {:.0} ms", builder.ms_per_char()));

        for (i, wait) in waits.iter().enumerate() {
            let digit = char::from(b'0' + (i % 10) as u8);
            builder.add_segment('-', wait.begin, false);
            builder.add_segment(digit, wait.end, false);
        }
        lines.push(builder.to_string());

        for download in &downloads {
            builder.reset();
            builder.add_segment(' ', download.begin, false);
            builder.add_segment('=', download.end, true);
            lines.push(format!(
                "{} #{} {:.0} ms {} rows",
                builder,
                download.chunk_index,
                millis_between(download.begin, download.end),
                download.row_count
            ));
        }

        lines
    }
}

impl DiagnosticsSink for TimelineRecorder {
    fn record_download(&self, stat: DownloadStatistic) {
        if let Ok(mut state) = self.state.lock() {
            state.downloads.push(stat);
        }
    }

    fn record_wait(&self, stat: WaitStatistic) {
        if let Ok(mut state) = self.state.lock() {
            state.waits.push(stat);
        }
    }

    fn finish(&self) {
        if !tracing::enabled!(tracing::Level::INFO) {
            return;
        }
        for line in self.render(Utc::now()) {
            info!("{}", line);
        }
    }
}

fn millis_between(begin: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - begin)
        .num_microseconds()
        .map(|us| us as f64 / 1000.0)
        .unwrap_or(f64::MAX)
}

/// Renders intervals on a fixed-width character line.
#[derive(Debug, Clone)]
pub struct TimelineBuilder {
    first: DateTime<Utc>,
    ms_per_char: f64,
    value: String,
}

impl TimelineBuilder {
    /// Map the span `first..last` onto `char_count` characters.
    pub fn new(first: DateTime<Utc>, last: DateTime<Utc>, char_count: usize) -> Self {
        let total_ms = millis_between(first, last).max(1.0);
        Self {
            first,
            ms_per_char: total_ms / char_count.max(1) as f64,
            value: String::new(),
        }
    }

    pub fn ms_per_char(&self) -> f64 {
        self.ms_per_char
    }

    /// Extend the line with `symbol` up to `target`.
    ///
    /// Nothing is added if the line already reaches past `target`. With
    /// `must_be_visible`, at least one symbol is added otherwise.
    pub fn add_segment(&mut self, symbol: char, target: DateTime<Utc>, must_be_visible: bool) {
        let current_ms = self.value.chars().count() as f64 * self.ms_per_char;
        let target_ms = millis_between(self.first, target);
        if target_ms < current_ms {
            return;
        }

        let mut n = ((target_ms - current_ms) / self.ms_per_char) as usize;
        if n == 0 && must_be_visible {
            n = 1;
        }
        self.value.extend(std::iter::repeat(symbol).take(n));
    }

    /// Clear the line for a new row.
    pub fn reset(&mut self) {
        self.value.clear();
    }
}

impl std::fmt::Display for TimelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}
