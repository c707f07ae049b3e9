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

//! Upload-then-stat round trips on the local transport.

use std::io::Cursor;
use std::sync::Arc;

use rexec::local::{Client, RunOptions, Transfer};
use rexec::parser::examples::PathExistenceParser;
use rexec::{run_parse, run_raw, Command, FileContent, FileSpec, FileTransfer};
use tokio_util::sync::CancellationToken;

fn spec(dir: &std::path::Path, content: FileContent) -> FileSpec {
    FileSpec {
        target_dir: dir.join("rexec").to_string_lossy().into_owned(),
        filename: "hello.txt".into(),
        mode: 0o644,
        folder_mode: 0o755,
        content: Some(content),
    }
}

#[tokio::test]
async fn upload_then_stat_round_trip() {
    let ctx = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let mut spec = spec(
        dir.path(),
        FileContent::Data(b"Hello, rexec!".to_vec()),
    );

    Transfer::new().copy(&ctx, &mut spec, ()).await.unwrap();

    let client = Client::default();
    let target = format!("{}/hello.txt", spec.target_dir);

    let exists_cmd = Command::new("test -f %s && echo true || echo false")
        .with_arg(target.clone())
        .with_parser(Arc::new(PathExistenceParser));
    let exists: bool = run_parse(&ctx, &client, &exists_cmd, RunOptions::default())
        .await
        .unwrap();
    assert!(exists);

    let cat_cmd = Command::new("cat %s").with_arg(target);
    let (stdout, _, exit_code, error) =
        run_raw(&ctx, &client, &cat_cmd, RunOptions::default()).await;
    assert_eq!(exit_code, 0);
    assert!(error.is_none());
    assert_eq!(stdout, "Hello, rexec!");
}

#[tokio::test]
async fn upload_from_stream_respects_position() {
    let ctx = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();

    let mut cursor = Cursor::new(b"skip:payload".to_vec());
    cursor.set_position(5);
    let mut spec = spec(dir.path(), FileContent::reader(cursor));

    Transfer::new().copy(&ctx, &mut spec, ()).await.unwrap();

    let written =
        std::fs::read(std::path::Path::new(&spec.target_dir).join("hello.txt")).unwrap();
    assert_eq!(written, b"payload");
}

#[tokio::test]
async fn upload_from_source_path() {
    let ctx = CancellationToken::new();
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.bin");
    std::fs::write(&source, b"from disk").unwrap();

    let mut spec = spec(dir.path(), FileContent::SourcePath(source));
    Transfer::new().copy(&ctx, &mut spec, ()).await.unwrap();

    let written =
        std::fs::read(std::path::Path::new(&spec.target_dir).join("hello.txt")).unwrap();
    assert_eq!(written, b"from disk");
}
