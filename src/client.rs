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

//! The client contract shared by the local and SSH substrates, plus the
//! convenience wrappers around it.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandId};
use crate::error::Error;
use crate::parser::RawResult;

/// Uniform command execution surface.
///
/// `run` executes `cmd`, captures its output, and, when the command carries
/// a parser and `dst` is supplied, parses the result into `dst`. Options
/// apply to this run only. The returned [`RawResult`] is always a value;
/// failures are recorded on its `error` field together with whatever
/// partial state was captured.
#[async_trait]
pub trait Client: Send + Sync {
    type Options: Default + Send;

    async fn run(
        &self,
        ctx: &CancellationToken,
        cmd: &Command,
        dst: Option<&mut (dyn Any + Send)>,
        opts: Self::Options,
    ) -> RawResult;

    /// Release all resources. Idempotent.
    async fn close(&self) -> Result<(), Error>;
}

/// Execute `cmd`, ignoring stdout/stderr, returning only the error.
pub async fn run_no_result<C: Client + ?Sized>(
    ctx: &CancellationToken,
    client: &C,
    cmd: &Command,
    opts: C::Options,
) -> Result<(), Error> {
    let mut result = client.run(ctx, cmd, None, opts).await;
    match result.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Execute `cmd` and return its stdout, stderr, exit code, and error.
pub async fn run_raw<C: Client + ?Sized>(
    ctx: &CancellationToken,
    client: &C,
    cmd: &Command,
    opts: C::Options,
) -> (String, String, i32, Option<Error>) {
    let result = client.run(ctx, cmd, None, opts).await;
    (result.stdout, result.stderr, result.exit_code, result.error)
}

/// Execute `cmd`, parse its output into a freshly allocated `T`, and
/// return it.
pub async fn run_parse<C, T>(
    ctx: &CancellationToken,
    client: &C,
    cmd: &Command,
    opts: C::Options,
) -> Result<T, Error>
where
    C: Client + ?Sized,
    T: Default + Send + 'static,
{
    let mut dst = T::default();
    let mut result = client.run(ctx, cmd, Some(&mut dst), opts).await;
    match result.error.take() {
        Some(err) => Err(err),
        None => Ok(dst),
    }
}

/// Run the registered parser for each executed command, storing the parsed
/// output into the paired destination. Only commands listed in `dsts` are
/// parsed; commands without a raw result are skipped; a destination paired
/// with a parser-less command is an error.
pub fn parse_with_mapping<'a, I>(
    results: &HashMap<CommandId, &RawResult>,
    dsts: I,
) -> Result<(), Error>
where
    I: IntoIterator<Item = (&'a Command, &'a mut (dyn Any + Send))>,
{
    for (cmd, dst) in dsts {
        let Some(raw) = results.get(&cmd.id()) else {
            continue;
        };
        let parser = cmd.parser().ok_or_else(|| {
            Error::Parse(format!(
                "dst is set, but parser is none for cmd {:?}",
                cmd.render()
            ))
        })?;
        parser.parse(raw, dst).map_err(|e| {
            Error::Parse(format!("parser failed for cmd {:?}: {e}", cmd.render()))
        })?;
    }
    Ok(())
}

/// Build the command-to-result map from a slice of results, then invoke
/// [`parse_with_mapping`] for the entries in `dsts`.
pub fn apply_parsers<'a, I>(results: &[RawResult], dsts: I) -> Result<(), Error>
where
    I: IntoIterator<Item = (&'a Command, &'a mut (dyn Any + Send))>,
{
    let map: HashMap<CommandId, &RawResult> =
        results.iter().map(|r| (r.command_id, r)).collect();
    parse_with_mapping(&map, dsts)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::parser::examples::BoolParser;

    fn result_for(cmd: &Command, stdout: &str) -> RawResult {
        let mut r = RawResult::new(cmd);
        r.stdout = stdout.to_string();
        r
    }

    #[test]
    fn mapping_parses_listed_commands_only() {
        let parsed = Command::new("echo true").with_parser(Arc::new(BoolParser));
        let unparsed = Command::new("echo noise");
        let results = vec![
            result_for(&parsed, "true"),
            result_for(&unparsed, "noise"),
        ];

        let mut flag = false;
        apply_parsers(
            &results,
            [(&parsed, &mut flag as &mut (dyn Any + Send))],
        )
        .expect("mapping should succeed");
        assert!(flag);
    }

    #[test]
    fn mapping_skips_commands_without_results() {
        let cmd = Command::new("echo true").with_parser(Arc::new(BoolParser));
        let mut flag = false;
        apply_parsers(&[], [(&cmd, &mut flag as &mut (dyn Any + Send))])
            .expect("absent results are skipped");
        assert!(!flag);
    }

    #[test]
    fn mapping_rejects_destination_without_parser() {
        let cmd = Command::new("echo true");
        let results = vec![result_for(&cmd, "true")];
        let mut flag = false;
        let err = apply_parsers(&results, [(&cmd, &mut flag as &mut (dyn Any + Send))])
            .unwrap_err();
        assert!(err.to_string().contains("parser is none"));
    }

    #[test]
    fn mapping_distinguishes_identical_command_text() {
        let first = Command::new("echo true").with_parser(Arc::new(BoolParser));
        let second = Command::new("echo true").with_parser(Arc::new(BoolParser));
        // Only the first command ran.
        let results = vec![result_for(&first, "true")];

        let mut first_flag = false;
        let mut second_flag = false;
        apply_parsers(
            &results,
            [
                (&first, &mut first_flag as &mut (dyn Any + Send)),
                (&second, &mut second_flag as &mut (dyn Any + Send)),
            ],
        )
        .expect("mapping should succeed");

        assert!(first_flag);
        assert!(!second_flag, "distinct identity despite identical text");
    }

    #[test]
    fn mapping_surfaces_parser_failures() {
        let cmd = Command::new("echo garbage").with_parser(Arc::new(BoolParser));
        let results = vec![result_for(&cmd, "garbage")];
        let mut flag = false;
        let err = apply_parsers(&results, [(&cmd, &mut flag as &mut (dyn Any + Send))])
            .unwrap_err();
        assert!(err.to_string().contains("parser failed"));
    }
}
