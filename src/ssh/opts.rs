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

//! Per-run options and runtime state for the SSH run engine.

use std::collections::BTreeMap;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::utils::buffer_pool::{global_buffer_pool, PooledBuffer};

/// Per-run overrides for one SSH command execution.
///
/// Defaults: no stdin, stdout/stderr captured into pooled buffers, not
/// streaming, buffering enabled.
#[derive(Default)]
pub struct RunOptions {
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) stdin: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub(crate) stdout: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub(crate) stderr: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub(crate) streaming: bool,
    pub(crate) disable_buffering: bool,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or override an environment variable for this run.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Feed the remote command's stdin from `reader`.
    pub fn with_stdin(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stdin = Some(Box::new(reader));
        self
    }

    /// Send live stdout to `writer` (in addition to capture, unless
    /// buffering is disabled).
    pub fn with_stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    /// Send live stderr to `writer` (in addition to capture, unless
    /// buffering is disabled).
    pub fn with_stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }

    /// Flush user writers after every chunk as data arrives.
    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Skip internal capture: only user-supplied writers receive output
    /// and the result's stdout/stderr stay empty.
    pub fn without_buffering(mut self) -> Self {
        self.disable_buffering = true;
        self
    }
}

/// Mutable state for one run: merged environment, I/O endpoints, capture
/// buffers, and the pending partial line used for prompt matching.
pub(crate) struct RunContext {
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) stdin: Option<Box<dyn AsyncRead + Send + Unpin>>,
    stdout: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    stderr: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    buf_out: PooledBuffer,
    buf_err: PooledBuffer,
    streaming: bool,
    disable_buffering: bool,
    line_pending: Vec<u8>,
}

impl RunContext {
    pub(crate) fn new(base_env: &BTreeMap<String, String>, opts: RunOptions) -> Self {
        let mut env = base_env.clone();
        env.extend(opts.env);
        Self {
            env,
            stdin: opts.stdin,
            stdout: opts.stdout,
            stderr: opts.stderr,
            buf_out: global_buffer_pool().get_capture_buffer(),
            buf_err: global_buffer_pool().get_capture_buffer(),
            streaming: opts.streaming,
            disable_buffering: opts.disable_buffering,
            line_pending: Vec::new(),
        }
    }

    /// Deliver a stdout chunk: user writer first (bytes as they arrive),
    /// then the capture buffer unless buffering is disabled. Writer
    /// failures are dropped; capture is authoritative.
    pub(crate) async fn write_stdout(&mut self, data: &[u8]) {
        if let Some(writer) = &mut self.stdout {
            let _ = writer.write_all(data).await;
            if self.streaming {
                let _ = writer.flush().await;
            }
        }
        if !self.disable_buffering || self.stdout.is_none() {
            self.buf_out.extend_from_slice(data);
        }
    }

    pub(crate) async fn write_stderr(&mut self, data: &[u8]) {
        if let Some(writer) = &mut self.stderr {
            let _ = writer.write_all(data).await;
            if self.streaming {
                let _ = writer.flush().await;
            }
        }
        if !self.disable_buffering || self.stderr.is_none() {
            self.buf_err.extend_from_slice(data);
        }
    }

    /// Scan a stdout chunk for a password prompt. Completed lines are
    /// checked one by one; the trailing partial line is checked too, since
    /// PTY prompts end without a newline. Returns true when any prompt
    /// matched; the pending line resets after a match so one prompt draws
    /// one answer.
    pub(crate) fn scan_password_prompt(&mut self, data: &[u8], prompt: &Regex) -> bool {
        self.line_pending.extend_from_slice(data);

        let mut matched = false;
        while let Some(pos) = self.line_pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.line_pending.drain(..=pos).collect();
            if prompt.is_match(&String::from_utf8_lossy(&line)) {
                matched = true;
            }
        }
        if !self.line_pending.is_empty()
            && prompt.is_match(&String::from_utf8_lossy(&self.line_pending))
        {
            matched = true;
        }
        if matched {
            self.line_pending.clear();
        }
        matched
    }

    /// Flush user writers and hand back the captured output.
    pub(crate) async fn finish(&mut self) -> (String, String) {
        if let Some(writer) = &mut self.stdout {
            let _ = writer.flush().await;
        }
        if let Some(writer) = &mut self.stderr {
            let _ = writer.flush().await;
        }
        (self.buf_out.to_text(), self.buf_err.to_text())
    }
}
