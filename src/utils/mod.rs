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

pub mod buffer_pool;
pub mod exit_code;

pub use buffer_pool::{global_buffer_pool, BufferPool, PooledBuffer};
pub use exit_code::ExitCodeMapper;

/// Quote a string for a POSIX shell: single-quoted, embedded single quotes
/// rewritten as `'\''`.
pub(crate) fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// Describe a recovered panic payload together with a captured backtrace.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let text = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("{text}\n{}", std::backtrace::Backtrace::force_capture())
}

/// Trim surrounding whitespace and cap at 200 characters for inclusion in
/// error messages.
pub(crate) fn trim_stderr(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() > 200 {
        let capped: String = trimmed.chars().take(200).collect();
        format!("{capped}...")
    } else {
        trimmed.to_string()
    }
}
