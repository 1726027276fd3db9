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

//! Types shared by the fetch collaborator, the downloader and the cursor.
//!
//! - `chunk`: descriptors locating each remote chunk
//! - `response`: the query response envelope (row type, inline rowset, chunk list)
//! - `config`: result set and logging configuration

pub mod chunk;
pub mod config;
pub mod response;
