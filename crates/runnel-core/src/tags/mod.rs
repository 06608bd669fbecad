//! Built-in tag library.
//!
//! Every tag here goes through the same extension point user tags do:
//! [`TagRegistry::register`] with a [`TagHandler`](crate::tag::TagHandler).
//! Nothing in the parser or renderer special-cases a built-in except the
//! verbatim block flag (`raw`, `comment`), which is part of the public
//! [`TagSpec`](crate::tag::TagSpec) contract.

mod assignment;
mod conditional;
mod iteration;
mod structure;

pub use assignment::{AssignTag, CaptureTag, DecrementTag, IncrementTag};
pub use conditional::{CaseTag, IfTag, UnlessTag};
pub use iteration::{CycleTag, ForTag};
pub use structure::{CommentTag, IncludeTag, LayoutTag, RawTag};

use crate::error::TemplateError;
use crate::syntax::{Cursor, Lex};
use crate::tag::TagRegistry;

/// Installs the built-in tags into a registry.
pub fn register_defaults(registry: &mut TagRegistry) -> Result<(), TemplateError> {
    registry.register("if", Box::new(IfTag))?;
    registry.register("unless", Box::new(UnlessTag))?;
    registry.register("case", Box::new(CaseTag))?;
    registry.register("for", Box::new(ForTag))?;
    registry.register("cycle", Box::new(CycleTag))?;
    registry.register("assign", Box::new(AssignTag))?;
    registry.register("capture", Box::new(CaptureTag))?;
    registry.register("increment", Box::new(IncrementTag))?;
    registry.register("decrement", Box::new(DecrementTag))?;
    registry.register("raw", Box::new(RawTag))?;
    registry.register("comment", Box::new(CommentTag))?;
    registry.register("include", Box::new(IncludeTag))?;
    registry.register("layout", Box::new(LayoutTag))?;
    Ok(())
}

/// Fails if a tag's argument text has unconsumed lexemes left.
pub(crate) fn expect_end(cursor: &Cursor, tag: &str, raw: &str) -> Result<(), TemplateError> {
    if cursor.at_end() {
        Ok(())
    } else {
        Err(TemplateError::parse_message(format!(
            "unexpected trailing arguments for tag '{}': '{}'",
            tag,
            raw.trim()
        )))
    }
}

/// Parses a tag argument that must be exactly one identifier.
pub(crate) fn single_ident(raw: &str, tag: &str) -> Result<String, TemplateError> {
    let lexemes = crate::syntax::lex(raw)?;
    match lexemes.as_slice() {
        [Lex::Ident(name)] => Ok(name.clone()),
        _ => Err(TemplateError::parse_message(format!(
            "tag '{}' expects a variable name, got '{}'",
            tag,
            raw.trim()
        ))),
    }
}
