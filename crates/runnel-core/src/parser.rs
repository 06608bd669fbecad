//! Building the AST from the token sequence.
//!
//! A single forward pass with constant lookahead, except that a block tag
//! recurses until its registered terminator appears. Intermediate markers
//! (`elsif`, `else`, `when`) split the accumulated children into branches;
//! only the innermost enclosing block's markers are recognized, so an `else`
//! belonging to an inner `if` can never leak into an outer one.

use std::vec::IntoIter;

use crate::ast::{Node, OutputNode, TagNode, Template};
use crate::error::{Position, TemplateError};
use crate::syntax;
use crate::tag::{Branch, Marker, TagInput, TagRegistry};
use crate::token::{tokenize, Token, TokenKind};

/// Template parser for one engine instance. Borrows the engine's tag
/// registry to recognize tags and delegate their argument grammars.
pub struct Parser<'e> {
    tags: &'e TagRegistry,
}

/// The innermost open block while parsing its children.
struct OpenBlock<'a> {
    tag: &'a str,
    position: Position,
    terminator: &'a str,
    markers: &'a [String],
}

impl<'e> Parser<'e> {
    pub fn new(tags: &'e TagRegistry) -> Self {
        Self { tags }
    }

    /// Tokenizes and parses a source string.
    pub fn parse(&self, source: &str) -> Result<Template, TemplateError> {
        self.parse_tokens(tokenize(source)?)
    }

    /// Parses an already-tokenized template.
    pub fn parse_tokens(&self, tokens: Vec<Token>) -> Result<Template, TemplateError> {
        let mut stream = tokens.into_iter();
        let mut branches = self.parse_branches(&mut stream, None)?;
        debug_assert_eq!(branches.len(), 1, "top level cannot have markers");
        Ok(Template {
            nodes: branches.pop().map(|b| b.nodes).unwrap_or_default(),
        })
    }

    /// Parses nodes until the stream ends (top level) or the enclosing
    /// block's terminator is consumed. Marker tags of the enclosing block
    /// start a new branch.
    fn parse_branches(
        &self,
        stream: &mut IntoIter<Token>,
        enclosing: Option<&OpenBlock<'_>>,
    ) -> Result<Vec<Branch>, TemplateError> {
        let mut branches = vec![Branch {
            marker: None,
            nodes: Vec::new(),
        }];

        while let Some(token) = stream.next() {
            match token.kind {
                TokenKind::Literal => {
                    let nodes = &mut branches.last_mut().unwrap().nodes;
                    nodes.push(Node::Literal(token.raw));
                }
                TokenKind::Output { expr } => {
                    let parsed = syntax::parse_output(&expr)
                        .map_err(|e| e.with_position(token.position))?;
                    branches.last_mut().unwrap().nodes.push(Node::Output(OutputNode {
                        expr: parsed,
                        position: token.position,
                    }));
                }
                TokenKind::Tag { name, args } => {
                    if let Some(block) = enclosing {
                        if name == block.terminator {
                            return Ok(branches);
                        }
                        if block.markers.iter().any(|m| *m == name) {
                            branches.push(Branch {
                                marker: Some(Marker {
                                    name,
                                    args,
                                    position: token.position,
                                }),
                                nodes: Vec::new(),
                            });
                            continue;
                        }
                    }
                    let node = self.parse_tag(stream, name, args, token.position)?;
                    branches.last_mut().unwrap().nodes.push(node);
                }
            }
        }

        match enclosing {
            Some(block) => Err(TemplateError::parse(
                format!(
                    "tag '{}' was never closed (expected '{}')",
                    block.tag, block.terminator
                ),
                block.position,
            )),
            None => Ok(branches),
        }
    }

    fn parse_tag(
        &self,
        stream: &mut IntoIter<Token>,
        name: String,
        args: String,
        position: Position,
    ) -> Result<Node, TemplateError> {
        let Some(handler) = self.tags.get(&name) else {
            return Err(TemplateError::parse(
                format!("unknown tag '{}'", name),
                position,
            ));
        };

        let spec = handler.spec();
        let branches = match spec.block_spec() {
            Some(block) if block.verbatim => {
                let body = self.collect_verbatim(stream, &name, &block.terminator, position)?;
                vec![Branch {
                    marker: None,
                    nodes: vec![Node::Literal(body)],
                }]
            }
            Some(block) => {
                let open = OpenBlock {
                    tag: &name,
                    position,
                    terminator: &block.terminator,
                    markers: &block.markers,
                };
                self.parse_branches(stream, Some(&open))?
            }
            None => Vec::new(),
        };

        let renderer = handler
            .parse(TagInput {
                name: &name,
                args: &args,
                position,
                branches,
            })
            .map_err(|e| e.with_position(position))?;

        Ok(Node::Tag(TagNode {
            name,
            position,
            renderer,
        }))
    }

    /// Consumes tokens verbatim until the terminator tag, concatenating
    /// their raw source spans. Used for `raw` and `comment` bodies, whose
    /// content must never be parsed.
    fn collect_verbatim(
        &self,
        stream: &mut IntoIter<Token>,
        tag: &str,
        terminator: &str,
        position: Position,
    ) -> Result<String, TemplateError> {
        let mut body = String::new();
        for token in stream.by_ref() {
            if matches!(&token.kind, TokenKind::Tag { name, .. } if name == terminator) {
                return Ok(body);
            }
            body.push_str(&token.raw);
        }
        Err(TemplateError::parse(
            format!("tag '{}' was never closed (expected '{}')", tag, terminator),
            position,
        ))
    }
}
