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

//! Single-file upload through the SFTP subsystem.

use std::sync::Arc;

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, OpenFlags};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::filespec::{FileSpec, FileTransfer};
use crate::utils::buffer_pool::global_buffer_pool;

use super::client::Client;

const DEFAULT_SFTP_BUFFER_SIZE: usize = 32 * 1024;
const DEFAULT_SFTP_DIR_MODE: u32 = 0o755;

/// Options for one SFTP transfer.
#[derive(Debug, Clone)]
pub struct SftpOptions {
    buffer_size: usize,
}

impl SftpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the streaming chunk size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        if buffer_size > 0 {
            self.buffer_size = buffer_size;
        }
        self
    }
}

impl Default for SftpOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_SFTP_BUFFER_SIZE,
        }
    }
}

/// Uploads files over the `sftp` subsystem.
pub struct SftpTransfer {
    client: Arc<Client>,
}

impl SftpTransfer {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Open the subsystem channel. The returned permit keeps the
    /// limiter slot held for the lifetime of the transfer.
    async fn open_sftp_session(
        &self,
        ctx: &CancellationToken,
    ) -> Result<(SftpSession, OwnedSemaphorePermit), Error> {
        let session = self
            .client
            .open_session(ctx)
            .await
            .map_err(|e| wrap(e, "open ssh session for sftp"))?;
        let (channel, permit) = session.into_parts();

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| Error::Transfer(format!("request sftp subsystem: {e}")))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| Error::Transfer(format!("sftp session init: {e}")))?;

        Ok((sftp, permit))
    }
}

#[async_trait]
impl FileTransfer for SftpTransfer {
    type Options = SftpOptions;

    async fn copy(
        &self,
        ctx: &CancellationToken,
        spec: &mut FileSpec,
        opts: SftpOptions,
    ) -> Result<(), Error> {
        spec.validate()?;

        let folder_mode = if spec.folder_mode > 0 {
            spec.folder_mode
        } else {
            DEFAULT_SFTP_DIR_MODE
        };

        let (sftp, _permit) = self.open_sftp_session(ctx).await?;
        let outcome = upload(ctx, &sftp, spec, folder_mode, opts.buffer_size).await;
        let _ = sftp.close().await;
        outcome
    }
}

async fn upload(
    ctx: &CancellationToken,
    sftp: &SftpSession,
    spec: &mut FileSpec,
    folder_mode: u32,
    buffer_size: usize,
) -> Result<(), Error> {
    mkdir_all(sftp, &spec.target_dir).await?;
    chmod(sftp, &spec.target_dir, folder_mode)
        .await
        .map_err(|e| wrap(e, "sftp chmod dir"))?;

    let remote_path = format!(
        "{}/{}",
        spec.target_dir.trim_end_matches('/'),
        spec.filename
    );
    let mut file = sftp
        .open_with_flags(
            remote_path.clone(),
            OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
        )
        .await
        .map_err(|e| Error::Transfer(format!("sftp open file: {e}")))?;

    let file_mode = spec.mode;
    let content = spec
        .content
        .as_mut()
        .ok_or_else(|| Error::Transfer("no file content provided".into()))?;
    let (mut reader, _) = content
        .reader_and_size()
        .await
        .map_err(|e| wrap(e, "sftp read source data"))?;

    let mut chunk = global_buffer_pool().get_transfer_buffer();
    chunk.as_mut_vec().resize(buffer_size, 0);
    loop {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = reader
            .read(chunk.as_mut_vec())
            .await
            .map_err(|e| Error::Transfer(format!("sftp read source data: {e}")))?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk.as_slice()[..n])
            .await
            .map_err(|e| Error::Transfer(format!("sftp write remote data: {e}")))?;
    }

    file.flush()
        .await
        .map_err(|e| Error::Transfer(format!("sftp flush remote file: {e}")))?;
    file.shutdown()
        .await
        .map_err(|e| Error::Transfer(format!("sftp close remote file: {e}")))?;

    chmod(sftp, &remote_path, file_mode)
        .await
        .map_err(|e| wrap(e, "sftp chmod file"))?;
    Ok(())
}

/// Create `path` and every missing parent, tolerating components that
/// already exist.
async fn mkdir_all(sftp: &SftpSession, path: &str) -> Result<(), Error> {
    let mut current = String::new();
    if path.starts_with('/') {
        current.push('/');
    }

    for component in path.split('/').filter(|c| !c.is_empty()) {
        if !current.is_empty() && !current.ends_with('/') {
            current.push('/');
        }
        current.push_str(component);

        if sftp.create_dir(current.as_str()).await.is_err() {
            let exists = sftp
                .try_exists(current.as_str())
                .await
                .map_err(|e| Error::Transfer(format!("sftp stat {current:?}: {e}")))?;
            if !exists {
                return Err(Error::Transfer(format!(
                    "sftp create target dir: {current:?}"
                )));
            }
        }
    }
    Ok(())
}

async fn chmod(sftp: &SftpSession, path: &str, mode: u32) -> Result<(), Error> {
    let mut attrs = FileAttributes::empty();
    attrs.permissions = Some(mode & 0o7777);
    sftp.set_metadata(path.to_string(), attrs)
        .await
        .map_err(Error::from)
}

fn wrap(e: Error, context: &str) -> Error {
    match e {
        Error::Cancelled => Error::Cancelled,
        other => Error::Transfer(format!("{context}: {other}")),
    }
}
