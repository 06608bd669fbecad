//! # Runnel Core — template compilation and rendering
//!
//! `runnel-core` is the engine pipeline behind the `runnel` crate:
//!
//! ```text
//! source text -> Tokenizer -> tokens -> Parser -> Template (AST)
//!                                                     |
//!                                    Scope + registries v
//!                                              Renderer -> output text
//! ```
//!
//! - [`token`]: splits source into literal / `{{ output }}` / `{% tag %}`
//!   tokens, each carrying its exact span and position.
//! - [`syntax`]: the expression language — literals, variable paths with
//!   dynamic indexing, comparison/boolean operators, filter pipelines, the
//!   truthiness contract, and the output stringification rule.
//! - [`parser`]: builds the reusable [`Template`] AST, delegating each tag's
//!   argument grammar to its registered handler.
//! - [`render`]: the tree-walking, suspension-capable renderer.
//!   [`RenderFlow::Break`] is the cooperative early-termination signal: a tag
//!   stops the render and the output so far is the successful result.
//! - [`scope`]: the chained variable context, with lazy memoized bindings.
//! - [`tag`] / [`filter`]: the engine-instance-scoped extension registries.
//! - [`tags`] / [`filters`]: the built-in libraries, registered through the
//!   same extension points user code uses.
//!
//! ## Example
//!
//! ```rust
//! use runnel_core::{filters, tags, FilterRegistry, Parser, Renderer, Scope, TagRegistry};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let mut tag_registry = TagRegistry::new();
//! tags::register_defaults(&mut tag_registry).unwrap();
//! let mut filter_registry = FilterRegistry::new();
//! filters::register_defaults(&mut filter_registry).unwrap();
//!
//! let template = Parser::new(&tag_registry)
//!     .parse("Hello, {{ name | upcase }}!")
//!     .unwrap();
//!
//! let mut scope = Scope::new(json!({"name": "world"}));
//! let renderer = Renderer::new(&tag_registry, &filter_registry);
//! let output = renderer.render_template(&template, &mut scope).await.unwrap();
//! assert_eq!(output, "Hello, WORLD!");
//! # });
//! ```
//!
//! Concurrency model: a parsed [`Template`] and both registries are
//! `Send + Sync` and shared freely across concurrent renders; each render
//! call owns its [`Scope`] exclusively. Output is always produced in
//! document order.

pub mod ast;
pub mod error;
pub mod filter;
pub mod filters;
pub mod parser;
pub mod render;
pub mod scope;
pub mod syntax;
pub mod tag;
pub mod tags;
pub mod token;

pub use ast::{Node, OutputNode, TagNode, Template};
pub use error::{ErrorKind, Position, TemplateError};
pub use filter::{FilterHandler, FilterRegistry};
pub use parser::Parser;
pub use render::{RenderFlow, Renderer, TemplateLoader};
pub use scope::{PathStep, Scope};
pub use syntax::{evaluate, is_falsy, is_truthy, to_display, Expression, OutputExpr};
pub use tag::{Branch, Marker, TagHandler, TagInput, TagRegistry, TagRenderer, TagSpec};
pub use token::{tokenize, Token, TokenKind, Tokenizer};

// Template data is plain serde_json; re-exported so hosts can build contexts
// without naming the dependency themselves.
pub use serde_json::{to_value, Value};
