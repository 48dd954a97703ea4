//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Fu.
//! The Fu project belongs to the Dunimd project team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//! http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Path DSL Module
//!
//! Parses the bracket micro-DSL appended to source strings:
//! `report.pdf[pages:1-3,images:false]`. One top-level bracket group,
//! comma-separated `key:value` commands, backslash escapes for `]`, `,`
//! and `\` inside values, and quoted regions that preserve brackets and
//! commas literally. A filename with literal brackets is written with
//! them escaped (`weird\[1\].pdf`) and parses back to the on-disk name.
//! `emit` is the inverse of `parse` for valid inputs.

use crate::attachment::FuCommands;
use crate::errors::{FuError, Result};

/// Outcome of parsing one source string.
#[derive(Clone, Debug)]
pub struct FuParsedSource {
    /// Source with the bracket group stripped.
    pub path: String,
    /// Commands in written order; duplicate keys resolved last-wins.
    pub commands: FuCommands,
    /// Non-fatal notes, e.g. duplicate-key overrides.
    pub warnings: Vec<String>,
}

fn syntax_error(offset: usize, message: impl Into<String>) -> FuError {
    FuError::DslSyntax {
        offset,
        message: message.into(),
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Splits a source string into path and commands.
///
/// The bracket group, when present, must close at the end of the string;
/// anything after the closing `]` is a syntax error. Escaped brackets in
/// the path portion (`\[`, `\]`) come back unescaped.
pub fn parse(source: &str) -> Result<FuParsedSource> {
    let open = match find_group_start(source)? {
        Some(idx) => idx,
        None => {
            return Ok(FuParsedSource {
                path: unescape_path(source),
                commands: FuCommands::new(),
                warnings: Vec::new(),
            })
        }
    };

    if !source.ends_with(']') {
        return Err(syntax_error(open, "unterminated command group"));
    }
    let path = unescape_path(&source[..open]);
    let body = &source[open + 1..source.len() - 1];
    let (commands, warnings) = parse_commands(body, open + 1)?;
    Ok(FuParsedSource {
        path,
        commands,
        warnings,
    })
}

/// Locates the top-level bracket group: the first unescaped `[`. A
/// backslash immediately before a bracket escapes it, so a path may
/// carry literal brackets as `\[` / `\]`; a backslash before anything
/// else is an ordinary path character (Windows separators pass
/// through untouched).
fn find_group_start(source: &str) -> Result<Option<usize>> {
    let mut chars = source.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some(&(_, next)) = chars.peek() {
                    if next == '[' || next == ']' {
                        chars.next();
                    }
                }
            }
            '[' => return Ok(Some(idx)),
            ']' if idx + 1 == source.len() => {
                return Err(syntax_error(idx, "unmatched ']'"));
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Strips the backslash from `\[` / `\]` in the path portion; every
/// other backslash stays literal.
fn unescape_path(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '[' || next == ']' {
                    chars.next();
                    out.push(next);
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn parse_commands(body: &str, base_offset: usize) -> Result<(FuCommands, Vec<String>)> {
    let mut commands = FuCommands::new();
    let mut warnings = Vec::new();

    let mut chars = body.char_indices().peekable();
    loop {
        // Skip leading whitespace before a key.
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&(key_start, _)) = chars.peek() else {
            break;
        };

        // Key.
        let mut key = String::new();
        while let Some(&(idx, c)) = chars.peek() {
            if is_key_char(c) {
                key.push(c);
                chars.next();
            } else if c == ':' || c.is_whitespace() {
                break;
            } else {
                return Err(syntax_error(
                    base_offset + idx,
                    format!("unexpected character '{c}' in command key"),
                ));
            }
        }
        if key.is_empty() {
            return Err(syntax_error(base_offset + key_start, "empty command key"));
        }

        // Separator.
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            Some((_, ':')) => {}
            Some((idx, c)) => {
                return Err(syntax_error(
                    base_offset + idx,
                    format!("expected ':' after key '{key}', found '{c}'"),
                ))
            }
            None => {
                return Err(syntax_error(
                    base_offset + body.len(),
                    format!("expected ':' after key '{key}'"),
                ))
            }
        }
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
            chars.next();
        }

        // Value: plain with escapes, or a quoted region preserving
        // brackets and commas literally.
        let mut value = String::new();
        let mut done = false;
        if let Some(&(_, quote)) = chars.peek() {
            if quote == '"' || quote == '\'' {
                chars.next();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(syntax_error(
                        base_offset + body.len(),
                        "unterminated quoted value",
                    ));
                }
                // After the closing quote only whitespace then ',' or end.
                while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
                    chars.next();
                }
                match chars.next() {
                    None => done = true,
                    Some((_, ',')) => {}
                    Some((idx, c)) => {
                        return Err(syntax_error(
                            base_offset + idx,
                            format!("unexpected '{c}' after quoted value"),
                        ))
                    }
                }
                insert_command(&mut commands, &mut warnings, key, value);
                if done {
                    break;
                }
                continue;
            }
        }

        let mut escaped = false;
        loop {
            match chars.next() {
                None => {
                    done = true;
                    break;
                }
                Some((idx, c)) => {
                    if escaped {
                        match c {
                            ']' | ',' | '\\' => value.push(c),
                            _ => {
                                return Err(syntax_error(
                                    base_offset + idx,
                                    format!("invalid escape '\\{c}'"),
                                ))
                            }
                        }
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == ',' {
                        break;
                    } else if c == ']' {
                        return Err(syntax_error(
                            base_offset + idx,
                            "unescaped ']' in value; escape it or quote the value",
                        ));
                    } else {
                        value.push(c);
                    }
                }
            }
        }
        if escaped {
            return Err(syntax_error(base_offset + body.len(), "dangling escape"));
        }
        insert_command(&mut commands, &mut warnings, key, value.trim_end().to_string());
        if done {
            break;
        }
    }

    Ok((commands, warnings))
}

fn insert_command(
    commands: &mut FuCommands,
    warnings: &mut Vec<String>,
    key: String,
    value: String,
) {
    if let Some(previous) = commands.insert(key.clone(), value) {
        warnings.push(format!(
            "duplicate DSL command '{key}': overriding earlier value '{previous}'"
        ));
    }
}

/// Renders a path and command map back into source form. Brackets in
/// the path and `]`/`,`/`\` in values are backslash-escaped, so
/// `parse(emit(p, c))` reproduces `(p, c)`.
pub fn emit(path: &str, commands: &FuCommands) -> String {
    let mut escaped_path = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '[' || c == ']' {
            escaped_path.push('\\');
        }
        escaped_path.push(c);
    }
    if commands.is_empty() {
        return escaped_path;
    }
    let body = commands
        .iter()
        .map(|(key, value)| {
            let mut escaped = String::with_capacity(value.len());
            for c in value.chars() {
                if matches!(c, ']' | ',' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            format!("{key}:{escaped}")
        })
        .collect::<Vec<_>>()
        .join(",");
    format!("{escaped_path}[{body}]")
}
