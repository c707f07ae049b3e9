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

//! Single-file upload over the classic SCP wire protocol.
//!
//! Sender side of `scp -t <dir>`: every phase is acknowledged by one zero
//! byte from the receiver; a non-zero byte is followed by an error message
//! up to the next newline. The flow is header, data, a lone NUL as EOF,
//! then the remote exit status.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::client::run_no_result;
use crate::command::Command;
use crate::error::Error;
use crate::filespec::{FileSpec, FileTransfer};
use crate::utils::buffer_pool::global_buffer_pool;
use crate::utils::shell_quote;

use super::client::Client;
use super::opts::RunOptions;

const DEFAULT_SCP_BUFFER_SIZE: usize = 32 * 1024;
const DEFAULT_SCP_DIR_MODE: u32 = 0o755;

/// Options for one SCP transfer.
#[derive(Debug, Clone)]
pub struct ScpOptions {
    scp_bin_path: String,
    buf_size: usize,
}

impl ScpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom `scp` binary path on the remote host.
    pub fn with_scp_bin_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if !path.is_empty() {
            self.scp_bin_path = path;
        }
        self
    }

    /// Override the streaming chunk size.
    pub fn with_buffer_size(mut self, buf_size: usize) -> Self {
        if buf_size > 0 {
            self.buf_size = buf_size;
        }
        self
    }
}

impl Default for ScpOptions {
    fn default() -> Self {
        Self {
            scp_bin_path: "scp".to_string(),
            buf_size: DEFAULT_SCP_BUFFER_SIZE,
        }
    }
}

/// Uploads files by piping data through a remote `scp -t`.
pub struct ScpTransfer {
    client: Arc<Client>,
}

impl ScpTransfer {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FileTransfer for ScpTransfer {
    type Options = ScpOptions;

    async fn copy(
        &self,
        ctx: &CancellationToken,
        spec: &mut FileSpec,
        opts: ScpOptions,
    ) -> Result<(), Error> {
        spec.validate()?;

        let folder_mode = if spec.folder_mode > 0 {
            spec.folder_mode
        } else {
            DEFAULT_SCP_DIR_MODE
        };
        let target = shell_quote(&spec.target_dir);

        // The target directory is created through the run engine before
        // the raw scp channel comes up.
        let mkdir = Command::new("mkdir -p -m %04o %s")
            .with_arg(folder_mode & 0o7777)
            .with_arg(target.clone());
        run_no_result(ctx, self.client.as_ref(), &mkdir, RunOptions::default())
            .await
            .map_err(|e| wrap(e, "remote mkdir"))?;

        let session = self
            .client
            .open_session(ctx)
            .await
            .map_err(|e| wrap(e, "open ssh session"))?;
        let (channel, _permit) = session.into_parts();

        let scp_cmd = format!("{} -t {}", opts.scp_bin_path, target);
        let mut wire = ScpWire::new(channel);
        wire.channel
            .exec(true, scp_cmd.as_str())
            .await
            .map_err(|e| Error::Transfer(format!("start scp [{scp_cmd}]: {e}")))?;

        wire.read_ack(ctx).await.map_err(|e| wrap(e, "initial ACK"))?;

        send_file(ctx, spec, &mut wire, opts.buf_size)
            .await
            .map_err(|e| wrap(e, "send file"))?;

        wire.close_stdin()
            .await
            .map_err(|e| wrap(e, "close stdin"))?;

        let (exit_status, stderr) = wire.wait_close().await;
        match exit_status {
            Some(0) => Ok(()),
            Some(code) => Err(Error::Transfer(format!(
                "scp failed ({}): {}",
                self.client.mapper().lookup(code as i32),
                stderr.trim()
            ))),
            None => Err(Error::Transfer(format!(
                "scp failed: no exit status -- {}",
                stderr.trim()
            ))),
        }
    }
}

/// Header, ACK, data, EOF byte, ACK.
async fn send_file(
    ctx: &CancellationToken,
    spec: &mut FileSpec,
    wire: &mut ScpWire,
    buf_size: usize,
) -> Result<(), Error> {
    let mode = spec.mode;
    let filename = spec.filename.clone();
    let content = spec
        .content
        .as_mut()
        .ok_or_else(|| Error::Transfer("no file content provided".into()))?;
    let (mut reader, size) = content.reader_and_size().await?;

    let header = scp_file_header(mode, size, &filename);
    wire.write_all(header.as_bytes())
        .await
        .map_err(|e| wrap(e, "write file header"))?;
    wire.read_ack(ctx)
        .await
        .map_err(|e| wrap(e, "ACK after header"))?;

    copy_chunked(ctx, reader.as_mut(), wire, buf_size)
        .await
        .map_err(|e| wrap(e, "send file data"))?;

    wire.write_all(&[0])
        .await
        .map_err(|e| wrap(e, "write EOF byte"))?;
    wire.read_ack(ctx).await.map_err(|e| wrap(e, "final ACK"))?;
    Ok(())
}

/// `C<mode> <size> <filename>\n`: mode as four octal digits, size as a
/// decimal byte count, filename unescaped.
fn scp_file_header(mode: u32, size: u64, filename: &str) -> String {
    format!("C{:04o} {} {}\n", mode & 0o7777, size, filename)
}

/// Copy from `reader` into the wire in fixed-size chunks, checking for
/// cancellation before each read.
async fn copy_chunked(
    ctx: &CancellationToken,
    reader: &mut (dyn AsyncRead + Send + Unpin),
    wire: &mut ScpWire,
    buf_size: usize,
) -> Result<(), Error> {
    let mut chunk = global_buffer_pool().get_transfer_buffer();
    chunk.as_mut_vec().resize(buf_size, 0);

    loop {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = reader.read(chunk.as_mut_vec()).await.map_err(Error::Io)?;
        if n == 0 {
            return Ok(());
        }
        wire.write_all(&chunk.as_slice()[..n]).await?;
    }
}

fn wrap(e: Error, context: &str) -> Error {
    match e {
        Error::Cancelled => Error::Cancelled,
        other => Error::Transfer(format!("{context}: {other}")),
    }
}

/// Duplex view of the scp channel: buffered remote stdout for ACK and
/// error-line reads, captured stderr for diagnostics, and the exit
/// status once the channel closes.
struct ScpWire {
    channel: Channel<Msg>,
    pending: VecDeque<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
    closed: bool,
}

impl ScpWire {
    fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            pending: VecDeque::new(),
            stderr: Vec::new(),
            exit_status: None,
            closed: false,
        }
    }

    async fn pump(&mut self) {
        match self.channel.wait().await {
            Some(ChannelMsg::Data { data }) => self.pending.extend(data.iter().copied()),
            Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                self.stderr.extend_from_slice(&data);
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                self.exit_status = Some(exit_status);
            }
            Some(_) => {}
            None => self.closed = true,
        }
    }

    async fn read_byte(&mut self) -> Result<u8, Error> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(byte);
            }
            if self.closed {
                return Err(Error::Transfer("unexpected end of scp stream".into()));
            }
            self.pump().await;
        }
    }

    async fn read_line(&mut self) -> String {
        let mut line = Vec::new();
        loop {
            match self.read_byte().await {
                Ok(b'\n') | Err(_) => break,
                Ok(byte) => line.push(byte),
            }
        }
        String::from_utf8_lossy(&line).into_owned()
    }

    /// One zero byte is an ACK; anything else fails with the error text
    /// the receiver sends up to the next newline.
    async fn read_ack(&mut self, ctx: &CancellationToken) -> Result<(), Error> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let byte = self.read_byte().await?;
        if byte != 0 {
            let message = self.read_line().await;
            return Err(Error::Transfer(format!("scp error: {}", message.trim())));
        }
        Ok(())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        self.channel.data(data).await.map_err(Error::from)
    }

    async fn close_stdin(&mut self) -> Result<(), Error> {
        self.channel.eof().await.map_err(Error::from)
    }

    /// Drain until the channel closes; returns the exit status and the
    /// captured stderr.
    async fn wait_close(&mut self) -> (Option<u32>, String) {
        while !self.closed {
            self.pump().await;
        }
        (
            self.exit_status,
            String::from_utf8_lossy(&self.stderr).into_owned(),
        )
    }
}
