//! Error types for template compilation and rendering.
//!
//! All fallible operations in this crate return [`TemplateError`]. The error is
//! a kind-tagged struct rather than an enum of distinct types so that outer
//! layers (file loading, caching) can attach context — a source position, a
//! template file path — without changing what kind of failure it is.
//!
//! Note that early render termination is *not* an error: a tag that wants to
//! stop rendering returns [`RenderFlow::Break`](crate::render::RenderFlow) and
//! the top-level render entry point treats that as successful completion.

use std::fmt;
use std::path::{Path, PathBuf};

/// A 1-based line/column position in template source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// What stage of the pipeline a [`TemplateError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed delimiters found while splitting source into tokens.
    Tokenize,
    /// Unrecognized tag, unmatched block, or malformed tag/output arguments.
    Parse,
    /// Evaluation failure while walking the AST (unknown filter, operator
    /// type mismatch, missing loader).
    Render,
    /// Invalid tag or filter registration.
    Validation,
    /// Filesystem failure while loading a template.
    Io,
    /// Template lookup failed across every configured root.
    NotFound,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Tokenize => "tokenization error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Render => "render error",
            ErrorKind::Validation => "validation error",
            ErrorKind::Io => "I/O error",
            ErrorKind::NotFound => "template not found",
        }
    }
}

/// Error produced by tokenizing, parsing, rendering, or registration.
///
/// Carries the failure kind plus whatever context the failing layer knew:
/// the source position of the offending construct and, once a file-loading
/// layer has seen the error, the template file path.
#[derive(Debug)]
pub struct TemplateError {
    kind: ErrorKind,
    message: String,
    position: Option<Position>,
    file: Option<PathBuf>,
}

impl TemplateError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            file: None,
        }
    }

    pub fn tokenize(message: impl Into<String>, position: Position) -> Self {
        Self::new(ErrorKind::Tokenize, message).with_position(position)
    }

    pub fn parse(message: impl Into<String>, position: Position) -> Self {
        Self::new(ErrorKind::Parse, message).with_position(position)
    }

    /// A parse failure with no source position yet; the parser attaches one
    /// when the expression text came from a token it knows the location of.
    pub fn parse_message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Render, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Attaches a source position if none is recorded yet. Errors keep the
    /// innermost (most precise) position they were first given.
    pub fn with_position(mut self, position: Position) -> Self {
        self.position.get_or_insert(position);
        self
    }

    /// Attaches the template file path the error came from. Does not change
    /// the error kind; outer layers use this to say *which* template failed.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file.get_or_insert(file.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.label())?;
        if let Some(pos) = self.position {
            write!(f, " at {}", pos)?;
        }
        if let Some(file) = &self.file {
            write!(f, " in {}", file.display())?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for TemplateError {}

impl From<std::io::Error> for TemplateError {
    fn from(err: std::io::Error) -> Self {
        TemplateError::new(ErrorKind::Io, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = TemplateError::render("unknown filter 'frobnicate'");
        let text = err.to_string();
        assert!(text.contains("render error"));
        assert!(text.contains("frobnicate"));
    }

    #[test]
    fn display_includes_position() {
        let err = TemplateError::parse("tag 'if' was never closed", Position::new(3, 7));
        assert!(err.to_string().contains("3:7"));
    }

    #[test]
    fn with_position_keeps_first() {
        let err = TemplateError::parse("boom", Position::new(1, 1))
            .with_position(Position::new(9, 9));
        assert_eq!(err.position(), Some(Position::new(1, 1)));
    }

    #[test]
    fn with_file_preserves_kind() {
        let err = TemplateError::render("bad").with_file("views/list.runnel");
        assert_eq!(err.kind(), ErrorKind::Render);
        assert!(err.to_string().contains("views/list.runnel"));
    }
}
