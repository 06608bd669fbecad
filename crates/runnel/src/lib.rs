//! # Runnel — a Liquid-style template engine
//!
//! Runnel compiles text containing `{{ output }}` interpolations and
//! `{% tag %}` control constructs into a reusable AST and renders it against
//! a caller-supplied context. Filters and tag bodies may be asynchronous
//! (an `include` reads another template, a filter may call out), so
//! rendering is a future; everything else is plain synchronous Rust.
//!
//! ## Quick start
//!
//! ```rust
//! use runnel::Engine;
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let engine = Engine::new();
//! let output = engine
//!     .parse_and_render(
//!         "Hello, {{ name | capitalize }}! {% if admin %}(admin){% endif %}",
//!         &json!({"name": "ada", "admin": true}),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(output, "Hello, Ada! (admin)");
//! # });
//! ```
//!
//! ## File-based templates
//!
//! [`Engine::render_file`] looks a template name up across the configured
//! root directories (first hit wins), appends the default extension to
//! extensionless names, and — with [`EngineBuilder::cache`] — memoizes the
//! compiled template by resolved path. The engine is also the loader behind
//! the `include` and `layout` tags, so partials resolve the same way.
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .root("./templates")
//!     .add_root("./themes/default")
//!     .cache(true)
//!     .build();
//! let page = engine.render_file("shop/product", &context).await?;
//! ```
//!
//! ## Extending the language
//!
//! Custom tags and filters register on the builder and are scoped to that
//! engine instance:
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .register_filter_fn("shout", |v, _| Ok(Value::String(format!("{}!", v))))?
//!     .register_tag("widget", Box::new(WidgetTag))?
//!     .build();
//! ```
//!
//! The full pipeline — tokenizer, expression language, parser, renderer,
//! scope, registries — lives in [`runnel_core`] and is re-exported here.

mod engine;

pub use engine::{Engine, EngineBuilder, Options};

pub use runnel_core::{
    evaluate, is_falsy, is_truthy, to_display, tokenize, ErrorKind, Expression, FilterHandler,
    FilterRegistry, Node, OutputExpr, Parser, Position, RenderFlow, Renderer, Scope, TagHandler,
    TagInput, TagRegistry, TagRenderer, TagSpec, Template, TemplateError, TemplateLoader, Token,
    TokenKind, Value,
};

/// The underlying pipeline crate, for hosts that need the lower-level
/// surface (token stream, AST nodes, standalone registries).
pub use runnel_core as core;
