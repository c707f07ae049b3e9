// Copyright 2025 Lablup Inc. and Jeongkyu Shin
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

pub mod client;
pub mod command;
pub mod error;
pub mod filespec;
pub mod local;
pub mod parser;
pub mod ssh;
pub mod utils;

pub use client::{apply_parsers, parse_with_mapping, run_no_result, run_parse, run_raw, Client};
pub use command::{Command, CommandArg, CommandId};
pub use error::Error;
pub use filespec::{ContentStream, FileContent, FileSpec, FileTransfer};
pub use parser::{Parser, RawResult};
