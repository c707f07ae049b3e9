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

//! Output parsing.
//!
//! A [`Parser`] turns a completed [`RawResult`] into a typed value through
//! an untyped out-parameter. Destinations are `&mut dyn Any`; parsers check
//! the expected shape with a downcast and fail with a descriptive error
//! otherwise, keeping parser implementations decoupled from the command's
//! type at the call boundary.

pub mod examples;

use std::any::Any;
use std::time::Duration;

use crate::command::{Command, CommandId};
use crate::error::Error;

/// Converts a raw execution result into a caller-supplied destination.
pub trait Parser: Send + Sync {
    fn parse(&self, raw: &RawResult, dst: &mut dyn Any) -> Result<(), Error>;
}

/// The outcome of running one command.
///
/// Always returned, even on failure: whatever stdout/stderr arrived before
/// the failure, a best-effort duration, and the exit classification are
/// preserved. `exit_code` is 0 on success, the remote exit status on
/// remote failure, and -1 for local cancellation or an unknown status.
#[derive(Debug)]
pub struct RawResult {
    /// The rendered command text that was executed.
    pub command: String,
    /// Identity of the [`Command`] that produced this result.
    pub command_id: CommandId,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    /// Terminal error of the run, if any. Parse errors land here too,
    /// without touching `exit_code`.
    pub error: Option<Error>,
}

impl RawResult {
    pub fn new(cmd: &Command) -> Self {
        Self {
            command: cmd.render(),
            command_id: cmd.id(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }

    /// True when execution (and parsing, if any) completed without error.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// Invoke the command's parser when both a parser and a destination are
/// present. A parse failure overwrites `result.error` but leaves the exit
/// code untouched: the remote process succeeded, only local interpretation
/// failed.
pub(crate) fn apply_parser(
    cmd: &Command,
    result: &mut RawResult,
    dst: Option<&mut (dyn Any + Send)>,
) {
    if let (Some(parser), Some(dst)) = (cmd.parser(), dst) {
        if let Err(e) = parser.parse(result, dst) {
            result.error = Some(Error::Parse(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::examples::BoolParser;
    use super::*;

    #[test]
    fn new_result_is_zeroed() {
        let cmd = Command::new("echo -n rexec");
        let result = RawResult::new(&cmd);
        assert_eq!(result.command, "echo -n rexec");
        assert_eq!(result.command_id, cmd.id());
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.duration, Duration::ZERO);
        assert!(result.success());
    }

    #[test]
    fn apply_parser_sets_error_and_keeps_exit_code() {
        let cmd = Command::new("echo garbage").with_parser(Arc::new(BoolParser));
        let mut result = RawResult::new(&cmd);
        result.stdout = "garbage".into();

        let mut dst = false;
        apply_parser(&cmd, &mut result, Some(&mut dst));

        assert_eq!(result.exit_code, 0);
        let err = result.error.expect("parse error expected");
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn apply_parser_skips_without_destination() {
        let cmd = Command::new("echo true").with_parser(Arc::new(BoolParser));
        let mut result = RawResult::new(&cmd);
        result.stdout = "true".into();

        apply_parser(&cmd, &mut result, None);
        assert!(result.success());
    }
}
