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

//! Local command execution through `sh -c` child processes.

use std::any::Any;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command as ProcessCommand;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::Error;
use crate::parser::{apply_parser, RawResult};
use crate::utils::exit_code::ExitCodeMapper;
use crate::utils::{panic_message, trim_stderr};

use super::config::Config;
use super::opts::RunOptions;

/// Runs commands on the local machine.
pub struct Client {
    cfg: Config,
    mapper: ExitCodeMapper,
}

impl Client {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            mapper: ExitCodeMapper::new(),
        }
    }

    async fn run_inner(
        &self,
        ctx: &CancellationToken,
        result: &mut RawResult,
        mut opts: RunOptions,
    ) {
        if let Err(e) = self.cfg.validate() {
            result.exit_code = -1;
            result.error = Some(e);
            return;
        }

        let mut command = ProcessCommand::new("sh");
        command.arg("-c").arg(&result.command);
        if let Some(dir) = opts.workdir.take().or_else(|| self.cfg.workdir.clone()) {
            command.current_dir(dir);
        }
        let mut env = self.cfg.env_vars.clone();
        env.append(&mut opts.env);
        command.envs(env);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                result.duration = started.elapsed();
                result.exit_code = -1;
                result.error = Some(Error::Execution {
                    description: format!("start command: {e}"),
                    stderr: String::new(),
                });
                return;
            }
        };

        // Drain both pipes off-task so a chatty child never blocks on a
        // full pipe while we wait for it.
        let mut stdout_pipe = child.stdout.take();
        let user_stdout = opts.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let Some(mut pipe) = stdout_pipe.take() else {
                return Vec::new();
            };
            match user_stdout {
                Some(mut writer) => {
                    let _ = tokio::io::copy(&mut pipe, &mut writer).await;
                    let _ = writer.flush().await;
                    Vec::new()
                }
                None => {
                    let mut captured = Vec::new();
                    let _ = pipe.read_to_end(&mut captured).await;
                    captured
                }
            }
        });

        let mut stderr_pipe = child.stderr.take();
        let user_stderr = opts.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let Some(mut pipe) = stderr_pipe.take() else {
                return Vec::new();
            };
            match user_stderr {
                Some(mut writer) => {
                    let _ = tokio::io::copy(&mut pipe, &mut writer).await;
                    let _ = writer.flush().await;
                    Vec::new()
                }
                None => {
                    let mut captured = Vec::new();
                    let _ = pipe.read_to_end(&mut captured).await;
                    captured
                }
            }
        });

        let status = tokio::select! {
            _ = ctx.cancelled() => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                None
            }
            status = child.wait() => Some(status),
        };
        result.duration = started.elapsed();

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        result.stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
        result.stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

        match status {
            None => {
                result.exit_code = -1;
                result.error = Some(Error::Cancelled);
            }
            Some(Ok(status)) if status.success() => {
                result.exit_code = 0;
            }
            Some(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                result.exit_code = code;
                result.error = Some(Error::Execution {
                    description: self.mapper.lookup(code),
                    stderr: trim_stderr(&result.stderr),
                });
            }
            Some(Err(e)) => {
                result.exit_code = -1;
                result.error = Some(Error::Execution {
                    description: format!("wait for command: {e}"),
                    stderr: trim_stderr(&result.stderr),
                });
            }
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[async_trait]
impl crate::client::Client for Client {
    type Options = RunOptions;

    async fn run(
        &self,
        ctx: &CancellationToken,
        cmd: &Command,
        dst: Option<&mut (dyn Any + Send)>,
        opts: RunOptions,
    ) -> RawResult {
        let mut result = RawResult::new(cmd);

        let body = async {
            self.run_inner(ctx, &mut result, opts).await;
            if !matches!(result.error, Some(Error::Cancelled)) {
                apply_parser(cmd, &mut result, dst);
            }
        };
        if let Err(panic) = std::panic::AssertUnwindSafe(body).catch_unwind().await {
            result.exit_code = -1;
            result.error = Some(Error::Panic(panic_message(panic.as_ref())));
        }
        result
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }
}
