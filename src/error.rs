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

//! Crate-wide error type.
//!
//! One variant per failure kind: configuration, authentication, dialing,
//! session management, execution, cancellation, transfer, parsing, and
//! recovered panics. Transport-level errors convert via `From`.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid or missing fields detected while building a configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No authentication method was available, or every offered method
    /// was rejected by the server.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Dial failure after all retry attempts.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The client has been closed or never held a live connection.
    #[error("session not open")]
    SessionNotOpen,

    /// Channel open, PTY request, or pipe acquisition failed.
    #[error("{0}")]
    Session(String),

    /// The process failed to start, or exited with a non-zero status.
    /// `description` carries the mapped exit-code text.
    #[error("command failed ({description}): {stderr}")]
    Execution { description: String, stderr: String },

    /// The caller's context was cancelled or its deadline passed.
    #[error("context cancelled or deadline exceeded")]
    Cancelled,

    /// SCP or SFTP transfer failure.
    #[error("{0}")]
    Transfer(String),

    /// A parser rejected the command output; the exit code is unaffected.
    #[error("parse error: {0}")]
    Parse(String),

    /// A panic recovered at the run boundary, with a captured backtrace.
    #[error("recovered from panic on run: {0}")]
    Panic(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    #[error("key: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("sftp: {0}")]
    Sftp(#[from] russh_sftp::client::error::Error),
}

impl Error {
    /// True when the error originates from context cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_message_carries_description_and_stderr() {
        let err = Error::Execution {
            description: "command not found".into(),
            stderr: "sh: no_such_cmd: not found".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("command not found"));
        assert!(msg.contains("no_such_cmd"));
    }

    #[test]
    fn cancelled_is_detectable() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::SessionNotOpen.is_cancelled());
    }

    #[test]
    fn io_error_converts() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().contains("gone"));
    }
}
