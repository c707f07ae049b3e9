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

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::io::AsyncWrite;

/// Per-run overrides for the local substrate.
///
/// Defaults: the client config's workdir and environment, stdout/stderr
/// captured into the result.
#[derive(Default)]
pub struct RunOptions {
    pub(crate) workdir: Option<PathBuf>,
    pub(crate) env: BTreeMap<String, String>,
    pub(crate) stdout: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    pub(crate) stderr: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run in `workdir` instead of the configured directory.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Add or override one environment variable for this run.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Send live stdout to `writer` instead of capturing it.
    pub fn with_stdout(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stdout = Some(Box::new(writer));
        self
    }

    /// Send live stderr to `writer` instead of capturing it.
    pub fn with_stderr(mut self, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.stderr = Some(Box::new(writer));
        self
    }
}
