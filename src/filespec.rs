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

//! File transfer specifications.
//!
//! A [`FileSpec`] names the destination (directory, filename, modes) and a
//! [`FileContent`] names exactly one byte source: an in-memory buffer, a
//! path on the local filesystem, or a seekable async stream. Every
//! transport consumes the same spec, so switching between local, SCP, and
//! SFTP copies is a one-line change.

use std::fmt;
use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Copies files described by a [`FileSpec`] to a target, applying
/// transport-specific options to a single transfer.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    type Options: Default + Send;

    async fn copy(
        &self,
        ctx: &CancellationToken,
        spec: &mut FileSpec,
        opts: Self::Options,
    ) -> Result<(), Error>;
}

/// A seekable async byte stream usable as file content.
///
/// Seekability is required so the transfer can announce an exact size up
/// front (the SCP header demands it) and then restore the stream position.
pub trait ContentStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> ContentStream for T {}

/// The source of file data for a transfer. Exactly one source per value.
pub enum FileContent {
    /// In-memory file data.
    Data(Vec<u8>),
    /// Path to a file on the local disk.
    SourcePath(PathBuf),
    /// An arbitrary seekable stream.
    Reader(Box<dyn ContentStream>),
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContent::Data(data) => f.debug_tuple("Data").field(&data.len()).finish(),
            FileContent::SourcePath(path) => f.debug_tuple("SourcePath").field(path).finish(),
            FileContent::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl FileContent {
    /// Wrap a seekable stream as file content.
    pub fn reader(stream: impl ContentStream + 'static) -> Self {
        FileContent::Reader(Box::new(stream))
    }

    fn is_empty(&self) -> bool {
        match self {
            FileContent::Data(data) => data.is_empty(),
            FileContent::SourcePath(path) => path.as_os_str().is_empty(),
            FileContent::Reader(_) => false,
        }
    }

    /// Produce a reader over the content together with its exact length in
    /// bytes. For a stream, the length is measured seek-end minus
    /// seek-current and the original position is restored before returning.
    pub async fn reader_and_size(
        &mut self,
    ) -> Result<(Box<dyn AsyncRead + Send + Unpin + '_>, u64), Error> {
        match self {
            FileContent::Data(data) if !data.is_empty() => {
                let size = data.len() as u64;
                Ok((Box::new(data.as_slice()), size))
            }
            FileContent::SourcePath(path) if !path.as_os_str().is_empty() => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| Error::Transfer(format!("open source file: {e}")))?;
                let meta = file
                    .metadata()
                    .await
                    .map_err(|e| Error::Transfer(format!("stat source file: {e}")))?;
                let size = meta.len();
                Ok((Box::new(file), size))
            }
            FileContent::Reader(stream) => {
                let current = stream
                    .seek(SeekFrom::Current(0))
                    .await
                    .map_err(|e| Error::Transfer(format!("seek current source stream: {e}")))?;
                let end = stream
                    .seek(SeekFrom::End(0))
                    .await
                    .map_err(|e| Error::Transfer(format!("seek end source stream: {e}")))?;
                stream
                    .seek(SeekFrom::Start(current))
                    .await
                    .map_err(|e| Error::Transfer(format!("restore source stream: {e}")))?;
                Ok((Box::new(stream.as_mut()), end - current))
            }
            _ => Err(Error::Transfer("no file content provided".into())),
        }
    }
}

/// Where and how to create a file on the target.
#[derive(Debug)]
pub struct FileSpec {
    /// Destination directory.
    pub target_dir: String,
    /// Name of the file to create.
    pub filename: String,
    /// Permission bits for the file.
    pub mode: u32,
    /// Permission bits for any created directories.
    pub folder_mode: u32,
    /// File data and its source.
    pub content: Option<FileContent>,
}

impl FileSpec {
    /// Check that the spec names a destination and carries content.
    pub fn validate(&self) -> Result<(), Error> {
        if self.filename.is_empty() {
            return Err(Error::Transfer("filename required".into()));
        }
        if self.target_dir.is_empty() {
            return Err(Error::Transfer("target directory required".into()));
        }
        match &self.content {
            None => Err(Error::Transfer("file content required".into())),
            Some(content) if content.is_empty() => {
                Err(Error::Transfer("file content empty".into()))
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn spec(content: Option<FileContent>) -> FileSpec {
        FileSpec {
            target_dir: "/tmp/rexec".into(),
            filename: "hello.txt".into(),
            mode: 0o644,
            folder_mode: 0o755,
            content,
        }
    }

    #[test]
    fn validate_accepts_complete_spec() {
        assert!(spec(Some(FileContent::Data(b"abc".to_vec())))
            .validate()
            .is_ok());
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut s = spec(Some(FileContent::Data(b"abc".to_vec())));
        s.filename.clear();
        assert!(s.validate().unwrap_err().to_string().contains("filename"));

        let mut s = spec(Some(FileContent::Data(b"abc".to_vec())));
        s.target_dir.clear();
        assert!(s
            .validate()
            .unwrap_err()
            .to_string()
            .contains("target directory"));

        assert!(spec(None)
            .validate()
            .unwrap_err()
            .to_string()
            .contains("content required"));

        assert!(spec(Some(FileContent::Data(Vec::new())))
            .validate()
            .unwrap_err()
            .to_string()
            .contains("content empty"));
    }

    #[tokio::test]
    async fn data_size_matches_bytes_read() {
        let mut content = FileContent::Data(b"hello scp".to_vec());
        let (mut reader, size) = content.reader_and_size().await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(size, buf.len() as u64);
        assert_eq!(buf, b"hello scp");
    }

    #[tokio::test]
    async fn source_path_size_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.txt");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let mut content = FileContent::SourcePath(path);
        let (mut reader, size) = content.reader_and_size().await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(size, 10);
        assert_eq!(buf.len(), 10);
    }

    #[tokio::test]
    async fn missing_source_path_fails() {
        let mut content = FileContent::SourcePath(PathBuf::from("/no/such/file/anywhere"));
        let err = content.reader_and_size().await.err().unwrap();
        assert!(err.to_string().contains("open source file"));
    }

    #[tokio::test]
    async fn stream_size_measured_from_current_position() {
        let mut cursor = Cursor::new(b"abcdef".to_vec());
        cursor.set_position(2);
        let mut content = FileContent::reader(cursor);

        let (mut reader, size) = content.reader_and_size().await.unwrap();
        assert_eq!(size, 4);
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"cdef");
    }

    #[tokio::test]
    async fn stream_at_end_reports_zero() {
        let mut cursor = Cursor::new(b"abc".to_vec());
        cursor.set_position(3);
        let mut content = FileContent::reader(cursor);

        let (_, size) = content.reader_and_size().await.unwrap();
        assert_eq!(size, 0);
    }
}
