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

//! File transfer to the local filesystem.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::filespec::{FileSpec, FileTransfer};

/// Writes files described by a [`FileSpec`] onto the local disk.
#[derive(Debug, Default)]
pub struct Transfer;

impl Transfer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileTransfer for Transfer {
    type Options = ();

    async fn copy(
        &self,
        ctx: &CancellationToken,
        spec: &mut FileSpec,
        _opts: (),
    ) -> Result<(), Error> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        spec.validate()?;

        let full_path = Path::new(&spec.target_dir).join(&spec.filename);
        let parent = full_path
            .parent()
            .ok_or_else(|| Error::Transfer("target directory required".into()))?
            .to_path_buf();

        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| Error::Transfer(format!("create directory: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if spec.folder_mode > 0 {
                spec.folder_mode
            } else {
                0o755
            };
            tokio::fs::set_permissions(&parent, std::fs::Permissions::from_mode(mode))
                .await
                .map_err(|e| Error::Transfer(format!("chmod directory: {e}")))?;
        }

        let mut open_options = tokio::fs::OpenOptions::new();
        open_options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        open_options.mode(spec.mode);
        let mut file = open_options
            .open(&full_path)
            .await
            .map_err(|e| Error::Transfer(format!("create target file: {e}")))?;

        let content = spec
            .content
            .as_mut()
            .ok_or_else(|| Error::Transfer("file content required".into()))?;
        let (mut reader, _) = content.reader_and_size().await?;
        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| Error::Transfer(format!("copy content: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filespec::FileContent;

    fn spec_in(dir: &Path, content: FileContent) -> FileSpec {
        FileSpec {
            target_dir: dir.to_string_lossy().into_owned(),
            filename: "hello.txt".into(),
            mode: 0o644,
            folder_mode: 0o755,
            content: Some(content),
        }
    }

    #[tokio::test]
    async fn writes_in_memory_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested");
        let mut spec = spec_in(&target, FileContent::Data(b"Hello, rexec!".to_vec()));

        Transfer::new()
            .copy(&CancellationToken::new(), &mut spec, ())
            .await
            .unwrap();

        let written = std::fs::read(target.join("hello.txt")).unwrap();
        assert_eq!(written, b"Hello, rexec!");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn applies_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec_in(dir.path(), FileContent::Data(b"x".to_vec()));
        spec.mode = 0o600;

        Transfer::new()
            .copy(&CancellationToken::new(), &mut spec, ())
            .await
            .unwrap();

        let meta = std::fs::metadata(dir.path().join("hello.txt")).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn rejects_invalid_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec_in(dir.path(), FileContent::Data(Vec::new()));
        let err = Transfer::new()
            .copy(&CancellationToken::new(), &mut spec, ())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("content empty"));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = spec_in(dir.path(), FileContent::Data(b"x".to_vec()));
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = Transfer::new().copy(&ctx, &mut spec, ()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dir.path().join("hello.txt").exists());
    }
}
