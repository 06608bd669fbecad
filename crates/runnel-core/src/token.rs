//! Splitting template source into literal, output, and tag tokens.
//!
//! The tokenizer is the first pipeline stage: it walks the raw source once and
//! produces a finite sequence of [`Token`]s, each carrying the exact source
//! span it came from. Concatenating every token's `raw` text reconstructs the
//! input byte for byte — nothing is lost between here and the parser.
//!
//! Scanning is deliberately conservative: the tokenizer does not understand
//! the expression language. It only knows the four delimiters and simple
//! quoting, so a close delimiter inside a quoted tag argument
//! (`{% greet "%}" %}`) does not truncate the construct.

use crate::error::{Position, TemplateError};

const OUTPUT_OPEN: &str = "{{";
const OUTPUT_CLOSE: &str = "}}";
const TAG_OPEN: &str = "{%";
const TAG_CLOSE: &str = "%}";

/// What a token is, plus the pre-split content the parser wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A verbatim run of template text.
    Literal,
    /// `{{ expression | filters }}` — carries the inner expression text.
    Output { expr: String },
    /// `{% name args %}` — carries the tag name and its raw argument text.
    Tag { name: String, args: String },
}

/// One token of template source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// The exact source span, delimiters included.
    pub raw: String,
    /// Position of the first byte of `raw`, 1-based.
    pub position: Position,
}

/// Tokenizes an entire source string.
pub fn tokenize(source: &str) -> Result<Vec<Token>, TemplateError> {
    Tokenizer::new(source).collect()
}

/// Lazy tokenizer over template source. Restart by constructing a new one.
pub struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            col: 1,
            failed: false,
        }
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.col)
    }

    /// Consumes `text` (which must be the input at `self.pos`), updating the
    /// line/column counters.
    fn advance(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += text.len();
    }

    /// Byte offset of the first construct opener in `rest`, with its closer.
    fn next_opener(rest: &str) -> Option<(usize, &'static str)> {
        let output = rest.find(OUTPUT_OPEN).map(|i| (i, OUTPUT_CLOSE));
        let tag = rest.find(TAG_OPEN).map(|i| (i, TAG_CLOSE));
        match (output, tag) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// Scans from just after an opener to its close delimiter, skipping quoted
    /// strings. Returns the byte length of the inner content.
    fn scan_to_close(rest: &str, close: &str) -> Option<usize> {
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\'' | b'"' => {
                    let quote = bytes[i];
                    i += 1;
                    while i < bytes.len() && bytes[i] != quote {
                        i += 1;
                    }
                    if i >= bytes.len() {
                        return None;
                    }
                    i += 1;
                }
                _ if rest[i..].starts_with(close) => return Some(i),
                _ => i += 1,
            }
        }
        None
    }

    fn construct_token(&mut self, close: &'static str) -> Result<Token, TemplateError> {
        let position = self.here();
        let rest = &self.input[self.pos..];
        let body = &rest[OUTPUT_OPEN.len()..];
        let Some(inner_len) = Self::scan_to_close(body, close) else {
            let what = if close == OUTPUT_CLOSE { "output" } else { "tag" };
            return Err(TemplateError::tokenize(
                format!("unterminated {} construct (expected '{}')", what, close),
                position,
            ));
        };
        let raw_len = OUTPUT_OPEN.len() + inner_len + close.len();
        let raw = &rest[..raw_len];
        let inner = body[..inner_len].trim();

        let kind = if close == OUTPUT_CLOSE {
            TokenKind::Output {
                expr: inner.to_string(),
            }
        } else {
            let mut parts = inner.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or("").to_string();
            if name.is_empty() {
                return Err(TemplateError::tokenize("tag is missing a name", position));
            }
            let args = parts.next().unwrap_or("").trim().to_string();
            TokenKind::Tag { name, args }
        };

        let token = Token {
            kind,
            raw: raw.to_string(),
            position,
        };
        let raw = raw.to_string();
        self.advance(&raw);
        Ok(token)
    }

    fn literal_token(&mut self, len: usize) -> Token {
        let position = self.here();
        let text = &self.input[self.pos..self.pos + len];
        let token = Token {
            kind: TokenKind::Literal,
            raw: text.to_string(),
            position,
        };
        let text = text.to_string();
        self.advance(&text);
        token
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, TemplateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.input.len() {
            return None;
        }
        let rest = &self.input[self.pos..];
        let item = match Self::next_opener(rest) {
            Some((0, close)) => self.construct_token(close),
            Some((idx, _)) => Ok(self.literal_token(idx)),
            None => Ok(self.literal_token(rest.len())),
        };
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
