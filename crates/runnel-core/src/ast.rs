//! The parsed, reusable representation of a template.
//!
//! A [`Template`] is an ordered sequence of [`Node`]s. Rendering never
//! mutates it, so one parsed template can back any number of concurrent
//! render calls.

use std::fmt;

use crate::error::Position;
use crate::syntax::OutputExpr;
use crate::tag::TagRenderer;

/// One node of the template tree.
pub enum Node {
    /// Verbatim text, appended to the output as-is.
    Literal(String),
    /// `{{ ... }}` — an expression plus filter pipeline.
    Output(OutputNode),
    /// `{% ... %}` — a tag occurrence; its children (for block tags) live
    /// inside the renderer the tag's handler built at parse time.
    Tag(TagNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputNode {
    pub expr: OutputExpr,
    pub position: Position,
}

pub struct TagNode {
    pub name: String,
    pub position: Position,
    pub renderer: Box<dyn TagRenderer>,
}

/// A compiled template: the root node sequence.
#[derive(Debug)]
pub struct Template {
    pub nodes: Vec<Node>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Node::Output(output) => f.debug_tuple("Output").field(output).finish(),
            Node::Tag(tag) => f
                .debug_struct("Tag")
                .field("name", &tag.name)
                .field("position", &tag.position)
                .finish_non_exhaustive(),
        }
    }
}
