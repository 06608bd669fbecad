//! Tag handlers and the per-engine tag registry.
//!
//! A tag is a named control construct (`{% ... %}`). Each registered
//! [`TagHandler`] declares two contracts:
//!
//! - a **parse contract** ([`TagSpec`]): whether the tag opens a block, what
//!   tag name terminates it, and which intermediate markers (`else`,
//!   `elsif`, `when`) split its children into branches;
//! - a **render contract**: `parse` turns the collected [`TagInput`] into a
//!   [`TagRenderer`], whose `render` receives the live renderer (to render
//!   child node sequences), the mutable scope, and the output buffer, and
//!   returns [`RenderFlow`] — `Break` to stop the whole render with the
//!   output produced so far.
//!
//! Handlers that push scope frames must pop them on every exit path, break
//! and error included.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::ast::Node;
use crate::error::{Position, TemplateError};
use crate::filter::validate_registration_name;
use crate::render::{RenderFlow, Renderer};
use crate::scope::Scope;

/// Parse contract of a tag: inline, or block-structured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    block: Option<BlockSpec>,
}

/// Block shape of a block-opening tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpec {
    /// Tag name that terminates the block (`endif` for `if`).
    pub terminator: String,
    /// Tag names that split the children into additional branches.
    pub markers: Vec<String>,
    /// Verbatim blocks keep their body as unparsed literal text (`raw`,
    /// `comment`).
    pub verbatim: bool,
}

impl TagSpec {
    /// A tag with no body.
    pub fn inline() -> Self {
        Self { block: None }
    }

    /// A block tag with the given terminator and intermediate markers.
    pub fn block(terminator: impl Into<String>, markers: &[&str]) -> Self {
        Self {
            block: Some(BlockSpec {
                terminator: terminator.into(),
                markers: markers.iter().map(|m| m.to_string()).collect(),
                verbatim: false,
            }),
        }
    }

    /// A block tag whose body is kept as literal text, never parsed.
    pub fn verbatim_block(terminator: impl Into<String>) -> Self {
        Self {
            block: Some(BlockSpec {
                terminator: terminator.into(),
                markers: Vec::new(),
                verbatim: true,
            }),
        }
    }

    pub fn block_spec(&self) -> Option<&BlockSpec> {
        self.block.as_ref()
    }

    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }
}

/// An intermediate marker tag encountered inside a block (`else`, `elsif`,
/// `when`), with its own raw arguments.
#[derive(Debug)]
pub struct Marker {
    pub name: String,
    pub args: String,
    pub position: Position,
}

/// One branch of a block tag's children. The first branch has no marker;
/// each subsequent branch starts at the marker that opened it.
#[derive(Debug)]
pub struct Branch {
    pub marker: Option<Marker>,
    pub nodes: Vec<Node>,
}

/// Everything the parser hands a tag handler: the tag's own raw arguments
/// and its (already parsed) branches. Inline tags receive no branches.
#[derive(Debug)]
pub struct TagInput<'a> {
    pub name: &'a str,
    pub args: &'a str,
    pub position: Position,
    pub branches: Vec<Branch>,
}

/// A registered tag behavior.
pub trait TagHandler: Send + Sync {
    /// The tag's parse contract. Consulted once per occurrence during parse.
    fn spec(&self) -> TagSpec;

    /// Parses the tag's argument grammar and children into a renderer.
    /// Failures here are parse errors carrying the tag's position.
    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError>;
}

/// The render contract produced by [`TagHandler::parse`]. Owned by the AST
/// node; must be shareable across concurrent renders.
pub trait TagRenderer: Send + Sync {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>>;
}

/// Name-keyed set of tags for one engine instance.
#[derive(Default)]
pub struct TagRegistry {
    tags: HashMap<String, Box<dyn TagHandler>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a tag. Fails with a validation error on an invalid or
    /// duplicate name, or a malformed block contract.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn TagHandler>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        validate_registration_name(&name, "tag")?;
        if self.tags.contains_key(&name) {
            return Err(TemplateError::validation(format!(
                "tag '{}' is already registered",
                name
            )));
        }
        if let Some(block) = handler.spec().block_spec() {
            if block.terminator.is_empty() {
                return Err(TemplateError::validation(format!(
                    "block tag '{}' declares an empty terminator",
                    name
                )));
            }
            for marker in &block.markers {
                if marker.is_empty() || *marker == block.terminator {
                    return Err(TemplateError::validation(format!(
                        "block tag '{}' declares an invalid marker '{}'",
                        name, marker
                    )));
                }
            }
        }
        self.tags.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn TagHandler> {
        self.tags.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(|s| s.as_str())
    }
}
