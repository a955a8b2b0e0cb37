//! Purpose: Database-free host implementations for the CLI harness and tests.
//! Exports: `LineScanner`, `TextBuffer`, `MemorySession`.
//! Role: Stand in for psql's scanner, `PQExpBuffer` and connection outside a psql process.
//! Invariants: `LineScanner` follows psql's slash-option quoting rules for the supported kinds.
//! Invariants: An unquoted backslash ends the option list; it is never consumed.
use std::collections::HashMap;

use super::{OptionKind, QueryBuffer, ScanState, Session};
use crate::core::error::Error;

/// Tokenizes the argument text that follows a backslash command.
#[derive(Debug, Clone)]
pub struct LineScanner {
    chars: Vec<char>,
    pos: usize,
}

impl LineScanner {
    pub fn new(line: &str) -> Self {
        Self {
            chars: line.chars().collect(),
            pos: 0,
        }
    }

    /// Unconsumed input, starting at the scanner position.
    pub fn remaining(&self) -> String {
        self.chars[self.pos..].iter().collect()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn take_rest(&mut self) -> String {
        let rest = self.remaining();
        self.pos = self.chars.len();
        rest.trim_end().to_string()
    }

    /// Reads one option word; unquoted trailing semicolons are dropped.
    fn read_word(&mut self, kind: OptionKind) -> String {
        let mut out = String::new();
        // Bytes up to here came from quotes and keep their semicolons.
        let mut quoted_len = 0;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '\\' {
                break;
            }
            self.pos += 1;
            match c {
                '\'' => {
                    self.read_single_quoted(&mut out);
                    quoted_len = out.len();
                }
                '"' => {
                    self.read_double_quoted(kind, &mut out);
                    quoted_len = out.len();
                }
                _ if kind == OptionKind::SqlId => out.extend(c.to_lowercase()),
                _ => out.push(c),
            }
        }
        while out.len() > quoted_len && out.ends_with(';') {
            out.pop();
        }
        out
    }

    fn read_single_quoted(&mut self, out: &mut String) {
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\'' => {
                    if self.peek() == Some('\'') {
                        self.pos += 1;
                        out.push('\'');
                    } else {
                        return;
                    }
                }
                '\\' => match self.peek() {
                    Some('0'..='7') => {
                        let code = self.read_code(8, 3);
                        out.push(char::from(code));
                    }
                    Some('x') if self.is_hex_at(self.pos + 1) => {
                        self.pos += 1;
                        let code = self.read_code(16, 2);
                        out.push(char::from(code));
                    }
                    Some(escaped) => {
                        self.pos += 1;
                        out.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            'b' => '\u{8}',
                            'f' => '\u{c}',
                            other => other,
                        });
                    }
                    None => out.push('\\'),
                },
                _ => out.push(c),
            }
        }
    }

    fn is_hex_at(&self, pos: usize) -> bool {
        self.chars.get(pos).is_some_and(char::is_ascii_hexdigit)
    }

    /// Reads up to `max_digits` digits in `radix`; the value wraps to a byte.
    fn read_code(&mut self, radix: u32, max_digits: usize) -> u8 {
        let mut value: u32 = 0;
        for _ in 0..max_digits {
            let Some(digit) = self.peek().and_then(|c| c.to_digit(radix)) else {
                break;
            };
            self.pos += 1;
            value = value * radix + digit;
        }
        (value & 0xff) as u8
    }

    fn read_double_quoted(&mut self, kind: OptionKind, out: &mut String) {
        let keep_quotes = !matches!(kind, OptionKind::SqlId | OptionKind::SqlIdHack);
        if keep_quotes {
            out.push('"');
        }
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '"' {
                if self.peek() == Some('"') {
                    self.pos += 1;
                    out.push('"');
                    if keep_quotes {
                        out.push('"');
                    }
                    continue;
                }
                if keep_quotes {
                    out.push('"');
                }
                return;
            }
            out.push(c);
        }
    }
}

impl ScanState for LineScanner {
    fn next_option(&mut self, kind: OptionKind) -> Option<String> {
        self.skip_whitespace();
        let first = self.peek()?;
        if first == '\\' {
            return None;
        }
        match kind {
            OptionKind::WholeLine => Some(self.take_rest()),
            OptionKind::FilePipe if first == '|' => Some(self.take_rest()),
            _ => Some(self.read_word(kind)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl QueryBuffer for TextBuffer {
    fn text(&self) -> Result<String, Error> {
        Ok(self.text.clone())
    }

    fn reset(&mut self) {
        self.text.clear();
    }

    fn append(&mut self, text: &str) -> Result<(), Error> {
        self.text.push_str(text);
        Ok(())
    }
}

/// A session with canned query results and no connection behind it.
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    last_error: Option<String>,
    scalars: HashMap<String, String>,
    executed: Vec<String>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_error(mut self, message: impl Into<String>) -> Self {
        self.last_error = Some(message.into());
        self
    }

    pub fn with_scalar(mut self, sql: impl Into<String>, value: impl Into<String>) -> Self {
        self.scalars.insert(sql.into(), value.into());
        self
    }

    /// Statements passed to `query_scalar`, in call order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl Session for MemorySession {
    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    fn query_scalar(&mut self, sql: &str) -> Result<Option<String>, Error> {
        self.executed.push(sql.to_string());
        Ok(self.scalars.get(sql).cloned())
    }
}
