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

//! Ready-made parsers for common shell output shapes.

use std::any::Any;

use regex::Regex;

use crate::error::Error;
use crate::parser::{Parser, RawResult};

/// Parses boolean-like stdout (`1`/`t`/`true`/`yes`/`y`/`on` and their
/// negative counterparts) into a `bool` destination.
pub struct BoolParser;

impl Parser for BoolParser {
    fn parse(&self, raw: &RawResult, dst: &mut dyn Any) -> Result<(), Error> {
        let flag = dst
            .downcast_mut::<bool>()
            .ok_or_else(|| Error::Parse("dst must be a bool".into()))?;
        let text = raw.stdout.trim().to_ascii_lowercase();
        match text.as_str() {
            "1" | "t" | "true" | "yes" | "y" | "on" => *flag = true,
            "0" | "f" | "false" | "no" | "n" | "off" => *flag = false,
            _ => {
                return Err(Error::Parse(format!(
                    "unrecognized bool value: {:?}",
                    raw.stdout
                )))
            }
        }
        Ok(())
    }
}

/// Sets a `bool` destination to whether stdout is exactly `true`
/// (case-insensitive, surrounding whitespace ignored). Pairs with
/// `test -f <path> && echo true || echo false`.
pub struct PathExistenceParser;

impl Parser for PathExistenceParser {
    fn parse(&self, raw: &RawResult, dst: &mut dyn Any) -> Result<(), Error> {
        let exists = dst
            .downcast_mut::<bool>()
            .ok_or_else(|| Error::Parse("dst must be a bool".into()))?;
        *exists = raw.stdout.trim().eq_ignore_ascii_case("true");
        Ok(())
    }
}

/// One line of `ls -la` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LsEntry {
    pub permissions: String,
    pub links: u32,
    pub owner: String,
    pub group: String,
    pub size: i64,
    pub month: String,
    pub day: String,
    pub time_or_year: String,
    pub name: String,
}

impl LsEntry {
    /// Interpret the permission string as unix mode bits. The first
    /// character selects the file type, the next nine the rwx triplets.
    pub fn parse_permissions(&self) -> Result<u32, Error> {
        let re = Regex::new(r"^[dlbcp\-s][rwx-]{9}").expect("permission pattern is valid");
        let matched = re
            .find(&self.permissions)
            .ok_or_else(|| Error::Parse(format!("invalid perm string: {:?}", self.permissions)))?;
        let perm = matched.as_str().as_bytes();

        let mut mode: u32 = match perm[0] {
            b'd' => 0o040000,
            b'l' => 0o120000,
            b'b' => 0o060000,
            b'c' => 0o020000,
            b'p' => 0o010000,
            b's' => 0o140000,
            _ => 0,
        };
        let bits: [(u8, u32); 9] = [
            (b'r', 0o400),
            (b'w', 0o200),
            (b'x', 0o100),
            (b'r', 0o040),
            (b'w', 0o020),
            (b'x', 0o010),
            (b'r', 0o004),
            (b'w', 0o002),
            (b'x', 0o001),
        ];
        for (i, (ch, bit)) in bits.iter().enumerate() {
            if perm[i + 1] == *ch {
                mode |= bit;
            }
        }
        Ok(mode)
    }
}

/// Parses `ls -la` output into a `Vec<LsEntry>` destination, skipping the
/// leading totals line and any line too short to be an entry.
pub struct LsParser;

impl Parser for LsParser {
    fn parse(&self, raw: &RawResult, dst: &mut dyn Any) -> Result<(), Error> {
        let out = dst
            .downcast_mut::<Vec<LsEntry>>()
            .ok_or_else(|| Error::Parse("dst must be a Vec<LsEntry>".into()))?;

        let mut entries = Vec::new();
        for (i, line) in raw.stdout.trim().lines().enumerate() {
            if i == 0
                && ["total", "Total", "итого", "Итого"]
                    .iter()
                    .any(|p| line.starts_with(p))
            {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 9 {
                continue;
            }

            let links: u32 = parts[1]
                .parse()
                .map_err(|e| Error::Parse(format!("invalid links {:?}: {e}", parts[1])))?;
            let size: i64 = parts[4]
                .parse()
                .map_err(|e| Error::Parse(format!("invalid size {:?}: {e}", parts[4])))?;

            entries.push(LsEntry {
                permissions: parts[0].to_string(),
                links,
                owner: parts[2].to_string(),
                group: parts[3].to_string(),
                size,
                month: parts[5].to_string(),
                day: parts[6].to_string(),
                time_or_year: parts[7].to_string(),
                name: parts[8..].join(" "),
            });
        }

        *out = entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    fn raw(stdout: &str) -> RawResult {
        let mut r = RawResult::new(&Command::new("test"));
        r.stdout = stdout.to_string();
        r
    }

    #[test]
    fn bool_parser_accepts_common_spellings() {
        let cases = [
            ("true", true),
            (" TRUE \n", true),
            ("yes", true),
            ("on", true),
            ("1", true),
            ("false", false),
            ("F", false),
            ("off", false),
            ("0", false),
        ];
        for (text, want) in cases {
            let mut got = !want;
            BoolParser
                .parse(&raw(text), &mut got)
                .unwrap_or_else(|e| panic!("{text:?}: {e}"));
            assert_eq!(got, want, "input {text:?}");
        }
    }

    #[test]
    fn bool_parser_rejects_unknown_text() {
        let mut got = false;
        let err = BoolParser.parse(&raw("maybe"), &mut got).unwrap_err();
        assert!(err.to_string().contains("unrecognized bool value"));
    }

    #[test]
    fn bool_parser_rejects_wrong_destination() {
        let mut got = String::new();
        let err = BoolParser.parse(&raw("true"), &mut got).unwrap_err();
        assert!(err.to_string().contains("must be a bool"));
    }

    #[test]
    fn path_existence_matches_true_only() {
        let mut got = false;
        PathExistenceParser.parse(&raw(" True \n"), &mut got).unwrap();
        assert!(got);
        PathExistenceParser.parse(&raw("false"), &mut got).unwrap();
        assert!(!got);
        PathExistenceParser.parse(&raw("yes"), &mut got).unwrap();
        assert!(!got);
    }

    #[test]
    fn ls_parser_single_entry() {
        let fixture = "total 2\n-rw-r--r-- 1 user group 123 Jan  1 12:00 file1\n";
        let mut entries: Vec<LsEntry> = Vec::new();
        LsParser.parse(&raw(fixture), &mut entries).unwrap();

        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.permissions, "-rw-r--r--");
        assert_eq!(e.links, 1);
        assert_eq!(e.owner, "user");
        assert_eq!(e.group, "group");
        assert_eq!(e.size, 123);
        assert_eq!(e.name, "file1");
    }

    #[test]
    fn ls_parser_multi_line_with_spaced_names() {
        let fixture = "total 2\n\
            -rw-r--r-- 1 user group 123 Jan  1 12:00 file1\n\
            lrwxrwxrwx 2 alice staff  64 Feb 28 2021 link -> target\n\
            invalid line\n\
            -rw------- 3 bob  dev   456 Mar 10 15:30 spaced file name.txt\n";
        let mut entries: Vec<LsEntry> = Vec::new();
        LsParser.parse(&raw(fixture), &mut entries).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].name, "link -> target");
        assert_eq!(entries[1].time_or_year, "2021");
        assert_eq!(entries[2].name, "spaced file name.txt");
        assert_eq!(entries[2].size, 456);
    }

    #[test]
    fn ls_parser_reports_bad_fields() {
        let bad_links = "total 1\n-rw-r--r-- X user group 123 Jan 1 00:00 f";
        let mut entries: Vec<LsEntry> = Vec::new();
        let err = LsParser.parse(&raw(bad_links), &mut entries).unwrap_err();
        assert!(err.to_string().contains("invalid links"));

        let bad_size = "total 1\n-rw-r--r-- 1 user group XYZ Jan 1 00:00 f";
        let err = LsParser.parse(&raw(bad_size), &mut entries).unwrap_err();
        assert!(err.to_string().contains("invalid size"));
    }

    #[test]
    fn ls_parser_rejects_wrong_destination() {
        let mut got = 0u32;
        let err = LsParser.parse(&raw("total 0"), &mut got).unwrap_err();
        assert!(err.to_string().contains("Vec<LsEntry>"));
    }

    #[test]
    fn permissions_round_trip() {
        let entry = LsEntry {
            permissions: "-rw-r--r--".into(),
            ..Default::default()
        };
        assert_eq!(entry.parse_permissions().unwrap() & 0o777, 0o644);

        let dir = LsEntry {
            permissions: "drwxr-xr-x".into(),
            ..Default::default()
        };
        let mode = dir.parse_permissions().unwrap();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(mode & 0o040000, 0o040000);

        let bad = LsEntry {
            permissions: "invalid".into(),
            ..Default::default()
        };
        assert!(bad.parse_permissions().is_err());
    }
}
