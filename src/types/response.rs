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

//! Query response envelope.
//!
//! These types map the `data` object of a query response: the column
//! description, the inline first rowset, and the list of remote chunks with
//! the query result master key (`qrmk`) shared by all of them.

use crate::error::Result;
use crate::types::chunk::ChunkDescriptor;
use serde::Deserialize;
use std::collections::HashMap;

/// Result data of an executed query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResultData {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(rename = "rowtype")]
    pub row_type: Vec<ColumnMeta>,
    /// Rows delivered inline with the response, ahead of any remote chunk.
    #[serde(rename = "rowset", default)]
    pub row_set: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub chunks: Option<Vec<ChunkInfo>>,
    /// Query result master key, valid for every chunk of this query.
    #[serde(default)]
    pub qrmk: Option<String>,
    #[serde(default)]
    pub chunk_headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub returned: Option<i64>,
}

/// Metadata of a single result column.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub precision: Option<i64>,
    #[serde(default)]
    pub scale: Option<i64>,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub byte_length: Option<i64>,
}

fn default_nullable() -> bool {
    true
}

impl ColumnMeta {
    /// Build column metadata without the optional numeric attributes.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            precision: None,
            scale: None,
            length: None,
            byte_length: None,
        }
    }
}

/// Declared semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Fixed,
    Real,
    Text,
    Date,
    Time,
    TimestampLtz,
    TimestampNtz,
    TimestampTz,
    Variant,
    Object,
    Array,
    Binary,
    Boolean,
    #[serde(other)]
    Unknown,
}

/// A remote chunk as listed in the response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub url: String,
    pub row_count: usize,
    #[serde(default)]
    pub uncompressed_size: usize,
    #[serde(default)]
    pub compressed_size: usize,
}

impl QueryResultData {
    /// Decode the `data` object of a query response.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn column_count(&self) -> usize {
        self.row_type.len()
    }

    /// Descriptors for the remote chunks, in ordinal order.
    pub fn chunk_descriptors(&self) -> Vec<ChunkDescriptor> {
        let headers = self.chunk_headers.clone().unwrap_or_default();
        self.chunks
            .iter()
            .flatten()
            .enumerate()
            .map(|(chunk_index, info)| ChunkDescriptor {
                chunk_index,
                url: info.url.clone(),
                row_count: info.row_count,
                uncompressed_size: info.uncompressed_size,
                compressed_size: info.compressed_size,
                http_headers: headers.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = r#"{
        "queryId": "01b2c3d4-0000-1111-0000-000000000001",
        "rowtype": [
            {"name": "ID", "type": "fixed", "precision": 38, "scale": 0, "nullable": false},
            {"name": "NAME", "type": "text", "length": 16777216, "byteLength": 16777216},
            {"name": "PAYLOAD", "type": "geography"}
        ],
        "rowset": [["1", "alpha", null], ["2", null, null]],
        "chunks": [
            {"url": "https://stage.example.com/r/data_0_0_1", "rowCount": 1000, "uncompressedSize": 64000, "compressedSize": 9000},
            {"url": "https://stage.example.com/r/data_0_0_2", "rowCount": 500, "uncompressedSize": 32000, "compressedSize": 4500}
        ],
        "qrmk": "c2VjcmV0LWtleQ==",
        "total": 1502,
        "returned": 1502
    }"#;

    #[test]
    fn test_query_result_data_parses_envelope() {
        let data = QueryResultData::from_json(RESPONSE).unwrap();

        assert_eq!(data.column_count(), 3);
        assert_eq!(data.row_type[0].column_type, ColumnType::Fixed);
        assert_eq!(data.row_type[0].scale, Some(0));
        assert!(!data.row_type[0].nullable);
        assert!(data.row_type[1].nullable);
        assert_eq!(data.row_type[2].column_type, ColumnType::Unknown);
        assert_eq!(data.row_set.len(), 2);
        assert_eq!(data.row_set[1][1], None);
        assert_eq!(data.qrmk.as_deref(), Some("c2VjcmV0LWtleQ=="));
    }

    #[test]
    fn test_chunk_descriptors_are_indexed_in_order() {
        let data = QueryResultData::from_json(RESPONSE).unwrap();
        let descriptors = data.chunk_descriptors();

        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].chunk_index, 0);
        assert_eq!(descriptors[1].chunk_index, 1);
        assert_eq!(descriptors[1].row_count, 500);
        assert!(descriptors[0].url.ends_with("data_0_0_1"));
        assert!(descriptors[0].http_headers.is_empty());
    }

    #[test]
    fn test_chunk_headers_copied_to_each_descriptor() {
        let json = r#"{
            "rowtype": [{"name": "A", "type": "text"}],
            "chunks": [{"url": "https://x/0", "rowCount": 1}, {"url": "https://x/1", "rowCount": 1}],
            "chunkHeaders": {"x-amz-server-side-encryption-customer-key": "abc"}
        }"#;
        let data = QueryResultData::from_json(json).unwrap();

        for descriptor in data.chunk_descriptors() {
            assert_eq!(descriptor.http_headers.len(), 1);
        }
        assert!(data.row_set.is_empty());
    }

    #[test]
    fn test_no_chunks_yields_no_descriptors() {
        let json = r#"{"rowtype": [{"name": "A", "type": "boolean"}], "rowset": [["1"]]}"#;
        let data = QueryResultData::from_json(json).unwrap();
        assert!(data.chunk_descriptors().is_empty());
    }
}
