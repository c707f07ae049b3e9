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

//! Human-readable descriptions for process exit codes.

use std::collections::HashMap;

const MAX_SIGNAL: i32 = 64;

/// Maps exit codes to short descriptions used in error messages.
///
/// Known shell, sysexits, and signal codes come from a fixed table; codes
/// in `(128, 128 + 64]` without a named entry fall back to
/// `killed by signal N`; everything else renders as `exit <code>`.
pub struct ExitCodeMapper {
    codes: HashMap<i32, &'static str>,
}

impl ExitCodeMapper {
    pub fn new() -> Self {
        let codes = HashMap::from([
            (1, "general error"),
            (2, "invalid usage of shell builtins"),
            (126, "permission denied (cannot execute)"),
            (127, "command not found"),
            (128, "invalid exit argument"),
            (64, "command line usage error"),
            (65, "data format error"),
            (66, "cannot open input file"),
            (67, "address unknown"),
            (68, "host name unknown"),
            (69, "service unavailable"),
            (70, "internal software error"),
            (71, "system error"),
            (72, "critical OS file missing"),
            (73, "cannot create output file"),
            (74, "input/output error"),
            (75, "temporary failure, please retry"),
            (76, "remote protocol error"),
            (77, "permission denied"),
            (78, "configuration error"),
            (129, "hangup (SIGHUP)"),
            (130, "script terminated by Control-C"),
            (131, "quit (SIGQUIT)"),
            (132, "illegal instruction (SIGILL)"),
            (133, "trace/breakpoint trap (SIGTRAP)"),
            (134, "abort (SIGABRT)"),
            (135, "bus error (SIGBUS)"),
            (136, "floating point exception (SIGFPE)"),
            (137, "process killed (SIGKILL)"),
            (138, "user defined signal 1 (SIGUSR1)"),
            (139, "segmentation fault (SIGSEGV)"),
            (140, "user defined signal 2 (SIGUSR2)"),
            (141, "broken pipe (SIGPIPE)"),
            (142, "alarm clock (SIGALRM)"),
            (143, "terminated by signal (SIGTERM)"),
            (255, "ssh connection error or no exit status"),
        ]);
        Self { codes }
    }

    /// Return the description for `code`, or `exit <code>` if unknown.
    pub fn lookup(&self, code: i32) -> String {
        if let Some(msg) = self.codes.get(&code) {
            return (*msg).to_string();
        }
        if code > 128 && code <= 128 + MAX_SIGNAL {
            return format!("killed by signal {}", code - 128);
        }
        format!("exit {code}")
    }
}

impl Default for ExitCodeMapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_use_table_entries() {
        let mapper = ExitCodeMapper::new();
        assert_eq!(mapper.lookup(126), "permission denied (cannot execute)");
        assert_eq!(mapper.lookup(127), "command not found");
        assert_eq!(mapper.lookup(128), "invalid exit argument");
        assert_eq!(mapper.lookup(137), "process killed (SIGKILL)");
        assert_eq!(mapper.lookup(255), "ssh connection error or no exit status");
    }

    #[test]
    fn signal_range_maps_to_signal_number() {
        let mapper = ExitCodeMapper::new();
        for code in 129..=(128 + MAX_SIGNAL) {
            let msg = mapper.lookup(code);
            if mapper.codes.contains_key(&code) {
                continue;
            }
            assert_eq!(msg, format!("killed by signal {}", code - 128));
        }
        assert_eq!(mapper.lookup(150), "killed by signal 22");
        assert_eq!(mapper.lookup(192), "killed by signal 64");
    }

    #[test]
    fn unknown_codes_fall_back_to_exit() {
        let mapper = ExitCodeMapper::new();
        assert_eq!(mapper.lookup(5), "exit 5");
        assert_eq!(mapper.lookup(-1), "exit -1");
        assert_eq!(mapper.lookup(193), "exit 193");
        assert_eq!(mapper.lookup(0), "exit 0");
    }
}
