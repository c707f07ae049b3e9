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

use crate::error::Error;

/// Settings for running commands on the local host.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Directory in which to execute commands. Empty means inherit.
    pub workdir: Option<PathBuf>,
    /// Additional environment variables for every run.
    pub env_vars: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory if non-empty.
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        let workdir = workdir.into();
        if !workdir.as_os_str().is_empty() {
            self.workdir = Some(workdir);
        }
        self
    }

    /// Add or override environment variables.
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Check that the working directory, when set, exists and is a
    /// directory.
    pub fn validate(&self) -> Result<(), Error> {
        let Some(workdir) = &self.workdir else {
            return Ok(());
        };
        let meta = std::fs::metadata(workdir).map_err(|e| {
            Error::Config(format!("workdir {:?}: {e}", workdir.display()))
        })?;
        if !meta.is_dir() {
            return Err(Error::Config(format!(
                "workdir {:?} is not a directory",
                workdir.display()
            )));
        }
        Ok(())
    }
}
