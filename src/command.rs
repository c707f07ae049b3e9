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

//! Shell command values.
//!
//! A [`Command`] pairs a printf-style template with positional arguments
//! and an optional output parser. Rendering substitutes the arguments into
//! the template; identity is per construction, not per rendered text, so
//! two commands with identical text remain distinct entities.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::parser::Parser;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Construction-unique command identity.
///
/// Stands in for pointer identity: every `Command::new` yields a fresh id,
/// so result-to-destination mappings never confuse two commands that happen
/// to render to the same text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(u64);

/// A positional argument for a command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    Text(String),
    Int(i64),
    Uint(u64),
}

impl CommandArg {
    fn format(&self, verb: char, width: usize, zero_pad: bool) -> String {
        match (self, verb) {
            (CommandArg::Text(s), _) => s.clone(),
            (CommandArg::Int(n), 'o') if zero_pad => format!("{n:0width$o}"),
            (CommandArg::Int(n), 'o') => format!("{n:o}"),
            (CommandArg::Int(n), _) => n.to_string(),
            (CommandArg::Uint(n), 'o') if zero_pad => format!("{n:0width$o}"),
            (CommandArg::Uint(n), 'o') => format!("{n:o}"),
            (CommandArg::Uint(n), _) => n.to_string(),
        }
    }
}

impl From<&str> for CommandArg {
    fn from(value: &str) -> Self {
        CommandArg::Text(value.to_string())
    }
}

impl From<String> for CommandArg {
    fn from(value: String) -> Self {
        CommandArg::Text(value)
    }
}

impl From<i32> for CommandArg {
    fn from(value: i32) -> Self {
        CommandArg::Int(value.into())
    }
}

impl From<i64> for CommandArg {
    fn from(value: i64) -> Self {
        CommandArg::Int(value)
    }
}

impl From<u32> for CommandArg {
    fn from(value: u32) -> Self {
        CommandArg::Uint(value.into())
    }
}

impl From<u64> for CommandArg {
    fn from(value: u64) -> Self {
        CommandArg::Uint(value)
    }
}

/// A shell command: template, positional arguments, optional parser.
pub struct Command {
    template: String,
    args: Vec<CommandArg>,
    parser: Option<Arc<dyn Parser>>,
    id: CommandId,
}

impl Command {
    /// Create a command from a printf-style template.
    ///
    /// Supported verbs: `%s`, `%d`, and `%o` (the latter with an optional
    /// zero-padded width such as `%04o`); `%%` renders a literal percent.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            args: Vec::new(),
            parser: None,
            id: CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed)),
        }
    }

    /// Append positional arguments for the template.
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<CommandArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a single positional argument.
    pub fn with_arg(mut self, arg: impl Into<CommandArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Attach a parser for the command's output.
    pub fn with_parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn parser(&self) -> Option<&Arc<dyn Parser>> {
        self.parser.as_ref()
    }

    /// Build the final shell command by substituting arguments into the
    /// template. Verbs left without a matching argument render literally.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len() + 16);
        let mut args = self.args.iter();
        let mut chars = self.template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }

            let mut spec = String::from("%");
            let mut zero_pad = false;
            let mut width = 0usize;
            if chars.peek() == Some(&'0') {
                zero_pad = true;
                spec.push('0');
                chars.next();
            }
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                width = width * 10 + d as usize;
                spec.push(char::from_digit(d, 10).unwrap_or('0'));
                chars.next();
            }

            match chars.next() {
                Some(verb @ ('s' | 'd' | 'o')) => match args.next() {
                    Some(arg) => out.push_str(&arg.format(verb, width, zero_pad)),
                    None => {
                        spec.push(verb);
                        out.push_str(&spec);
                    }
                },
                Some(other) => {
                    spec.push(other);
                    out.push_str(&spec);
                }
                None => out.push_str(&spec),
            }
        }

        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("template", &self.template)
            .field("args", &self.args)
            .field("parser", &self.parser.is_some())
            .field("id", &self.id)
            .finish()
    }
}
