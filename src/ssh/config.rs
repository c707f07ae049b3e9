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

//! SSH client configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::error::Error;

use super::auth::AuthStack;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const DEFAULT_MAX_SESSIONS: usize = 1;
const MAX_SESSIONS_LIMIT: usize = 6;

/// Settings for establishing and managing one SSH connection.
///
/// Built through [`Config::builder`]; all validation happens in
/// [`ConfigBuilder::build`].
#[derive(Debug)]
pub struct Config {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub(crate) timeout: Duration,
    pub(crate) retry_count: u32,
    pub(crate) retry_interval: Duration,
    pub(crate) keep_alive: Duration,
    pub(crate) known_hosts_path: Option<PathBuf>,
    pub(crate) sudo_password: Option<Zeroizing<String>>,
    pub(crate) env_vars: BTreeMap<String, String>,
    pub(crate) remote_workdir: Option<String>,
    pub(crate) max_sessions: usize,
    pub(crate) auth: AuthStack,
}

impl Config {
    /// Start building a config for `user@host:port`.
    pub fn builder(
        user: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> ConfigBuilder {
        ConfigBuilder {
            user: user.into(),
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            keep_alive: DEFAULT_KEEP_ALIVE,
            known_hosts_path: None,
            sudo_password: None,
            env_vars: BTreeMap::new(),
            remote_workdir: None,
            max_sessions: DEFAULT_MAX_SESSIONS,
            auth: AuthStack::default(),
        }
    }
}

/// Accumulates settings and validates them on [`build`](Self::build).
#[derive(Debug)]
pub struct ConfigBuilder {
    user: String,
    host: String,
    port: u16,
    timeout: Duration,
    retry_count: u32,
    retry_interval: Duration,
    keep_alive: Duration,
    known_hosts_path: Option<PathBuf>,
    sudo_password: Option<Zeroizing<String>>,
    env_vars: BTreeMap<String, String>,
    remote_workdir: Option<String>,
    max_sessions: usize,
    auth: AuthStack,
}

impl ConfigBuilder {
    /// Set the dial timeout for each connection attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection retry count and the delay between attempts.
    /// The dial is attempted `count + 1` times in total.
    pub fn retry(mut self, count: u32, interval: Duration) -> Self {
        self.retry_count = count;
        self.retry_interval = interval;
        self
    }

    /// Set the TCP keepalive interval.
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Verify the server host key against a known_hosts file. Without
    /// this, any host key is accepted.
    pub fn known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    /// Configure the password answered to sudo prompts on the remote
    /// host.
    pub fn sudo_password(mut self, password: impl Into<String>) -> Self {
        self.sudo_password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Merge environment variables exported into every remote session.
    pub fn env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the remote working directory commands run in.
    pub fn workdir(mut self, path: impl Into<String>) -> Self {
        self.remote_workdir = Some(path.into());
        self
    }

    /// Set the maximum concurrent sessions on this connection. Servers
    /// enforce `MaxSessions` in sshd_config; values between 1 and 4 are
    /// recommended, 6 is the hard cap.
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Enable SSH agent authentication.
    pub fn agent_auth(mut self) -> Self {
        self.auth = self.auth.with_agent();
        self
    }

    /// Enable private key authentication from a key file.
    pub fn key_path_auth(
        mut self,
        path: impl Into<PathBuf>,
        passphrase: Option<&str>,
    ) -> Self {
        self.auth = self.auth.with_key_path(path.into(), passphrase);
        self
    }

    /// Enable private key authentication from in-memory key data.
    pub fn key_bytes_auth(mut self, key_data: impl Into<String>, passphrase: Option<&str>) -> Self {
        self.auth = self.auth.with_key_bytes(key_data.into(), passphrase);
        self
    }

    /// Enable password authentication (keyboard-interactive first, then
    /// plain password).
    pub fn password_auth(mut self, password: impl Into<String>) -> Self {
        self.auth = self.auth.with_password(password.into());
        self
    }

    /// Validate the accumulated settings and produce the config.
    pub fn build(self) -> Result<Config, Error> {
        if self.user.is_empty() {
            return Err(Error::Config("user required".into()));
        }
        if self.host.is_empty() {
            return Err(Error::Config("host required".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be between 1 and 65535".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be positive".into()));
        }
        if self.keep_alive.is_zero() {
            return Err(Error::Config("keepalive must be positive".into()));
        }
        if self.max_sessions == 0 || self.max_sessions > MAX_SESSIONS_LIMIT {
            return Err(Error::Config("max sessions must be between 1 and 6".into()));
        }
        if let Some(path) = &self.known_hosts_path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "known_hosts file {:?} does not exist",
                    path.display()
                )));
            }
        }
        if let Some(password) = &self.sudo_password {
            if password.is_empty() {
                return Err(Error::Config("sudo password must not be empty".into()));
            }
        }
        if let Some(workdir) = &self.remote_workdir {
            if workdir.is_empty() {
                return Err(Error::Config("workdir path cannot be empty".into()));
            }
        }
        if self.auth.is_empty() {
            return Err(Error::Config(
                "at least one authentication method required".into(),
            ));
        }

        Ok(Config {
            user: self.user,
            host: self.host,
            port: self.port,
            timeout: self.timeout,
            retry_count: self.retry_count,
            retry_interval: self.retry_interval,
            keep_alive: self.keep_alive,
            known_hosts_path: self.known_hosts_path,
            sudo_password: self.sudo_password,
            env_vars: self.env_vars,
            remote_workdir: self.remote_workdir,
            max_sessions: self.max_sessions,
            auth: self.auth,
        })
    }
}
