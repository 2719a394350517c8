//! Line-aware token reader shared by the plain-text file formats

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use relex_core::{RelexError, Result};

static PAREN_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[()]|[^\s()]+").expect("token pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Whitespace,
    Parens,
}

pub struct TokenReader<R> {
    reader: R,
    mode: Mode,
    skip_comments: bool,
    pending: VecDeque<String>,
    line_no: usize,
}

impl TokenReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| RelexError::io(path, e))?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TokenReader<R> {
    /// Whitespace-separated tokens
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            mode: Mode::Whitespace,
            skip_comments: false,
            pending: VecDeque::new(),
            line_no: 0,
        }
    }

    /// Parentheses become tokens of their own
    pub fn with_parens(mut self) -> Self {
        self.mode = Mode::Parens;
        self
    }

    /// Ignore lines whose first non-blank character is `#`
    pub fn with_comments(mut self) -> Self {
        self.skip_comments = true;
        self
    }

    pub fn line_no(&self) -> usize {
        self.line_no
    }

    fn read_raw_line(&mut self) -> Result<Option<String>> {
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .map_err(|e| RelexError::Other(anyhow::Error::new(e)))?;
            if n == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || (self.skip_comments && trimmed.starts_with('#')) {
                continue;
            }
            return Ok(Some(trimmed.to_string()));
        }
    }

    pub fn next_token(&mut self) -> Result<Option<String>> {
        while self.pending.is_empty() {
            let line = match self.read_raw_line()? {
                Some(line) => line,
                None => return Ok(None),
            };
            match self.mode {
                Mode::Whitespace => self
                    .pending
                    .extend(line.split_whitespace().map(str::to_string)),
                Mode::Parens => self
                    .pending
                    .extend(PAREN_TOKEN.find_iter(&line).map(|m| m.as_str().to_string())),
            }
        }
        Ok(self.pending.pop_front())
    }

    /// Remaining tokens of the current line, or the next non-blank line
    pub fn next_line(&mut self) -> Result<Option<String>> {
        if !self.pending.is_empty() {
            let rest: Vec<String> = self.pending.drain(..).collect();
            return Ok(Some(rest.join(" ")));
        }
        self.read_raw_line()
    }

    pub fn expect_token(&mut self, what: &str) -> Result<String> {
        self.next_token()?.ok_or_else(|| {
            RelexError::MalformedInput(format!(
                "unexpected end of input at line {}, expected {}",
                self.line_no, what
            ))
        })
    }

    pub fn parse_next<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let token = self.expect_token(what)?;
        token.parse().map_err(|_| {
            RelexError::MalformedInput(format!(
                "expected {} at line {}, found '{}'",
                what, self.line_no, token
            ))
        })
    }
}
