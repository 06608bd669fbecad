//! Tree-walking evaluation of a parsed template.
//!
//! The renderer walks the node sequence in document order, appending to one
//! output buffer. Suspension points are exactly the filter and tag invocation
//! boundaries; sibling nodes never render concurrently, because later nodes
//! may depend on side effects (assignments) from earlier ones.
//!
//! ## Early termination
//!
//! A tag may return [`RenderFlow::Break`] to stop the whole render. `Break`
//! is threaded explicitly through every node-sequence step — every caller
//! propagates it — and [`Renderer::render_template`], the topmost entry
//! point, converts it into successful completion with the output produced so
//! far. It is not an error and cannot reach the host as one.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::ast::{Node, Template};
use crate::error::TemplateError;
use crate::filter::FilterRegistry;
use crate::scope::Scope;
use crate::syntax;
use crate::tag::TagRegistry;

/// Outcome of rendering a node sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFlow {
    /// Keep rendering subsequent siblings.
    Continue,
    /// Stop the entire render; the output buffer is already final.
    Break,
}

impl RenderFlow {
    pub fn is_break(self) -> bool {
        matches!(self, RenderFlow::Break)
    }
}

/// The asynchronous load-related-template capability handed to tag handlers
/// (`include`, `layout`). The core never touches the filesystem itself; an
/// outer layer implements lookup, reading, parsing, and caching.
pub trait TemplateLoader: Send + Sync {
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Arc<Template>, TemplateError>>;
}

/// A render call's view of one engine instance: borrowed registries plus the
/// optional loader capability. Cheap to construct per call; the registries
/// are read-only for its whole lifetime.
pub struct Renderer<'e> {
    tags: &'e TagRegistry,
    filters: &'e FilterRegistry,
    loader: Option<&'e dyn TemplateLoader>,
}

impl<'e> Renderer<'e> {
    pub fn new(tags: &'e TagRegistry, filters: &'e FilterRegistry) -> Self {
        Self {
            tags,
            filters,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: &'e dyn TemplateLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn tags(&self) -> &TagRegistry {
        self.tags
    }

    pub fn filters(&self) -> &FilterRegistry {
        self.filters
    }

    /// Renders a whole template. This is the topmost entry point: a `Break`
    /// propagating out of the node walk is treated as successful completion
    /// and the output produced so far is returned.
    pub async fn render_template(
        &self,
        template: &Template,
        scope: &mut Scope,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_nodes(&template.nodes, scope, &mut out).await?;
        Ok(out)
    }

    /// Renders one node sequence into `out`, in document order.
    ///
    /// Tag handlers call this to render their child branches against a scope
    /// they control. `Break` short-circuits the sequence and must be
    /// propagated by every caller that is not the topmost entry point.
    pub fn render_nodes<'a>(
        &'a self,
        nodes: &'a [Node],
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            for node in nodes {
                match node {
                    Node::Literal(text) => out.push_str(text),
                    Node::Output(output) => {
                        let value = syntax::eval_output(&output.expr, scope, self.filters)
                            .await
                            .map_err(|e| e.with_position(output.position))?;
                        out.push_str(&syntax::to_display(&value));
                    }
                    Node::Tag(tag) => {
                        let flow = tag
                            .renderer
                            .render(self, scope, out)
                            .await
                            .map_err(|e| e.with_position(tag.position))?;
                        if flow.is_break() {
                            return Ok(RenderFlow::Break);
                        }
                    }
                }
            }
            Ok(RenderFlow::Continue)
        })
    }

    /// Loads a related template through the configured loader capability.
    pub async fn load_template(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        match self.loader {
            Some(loader) => loader.load(name).await,
            None => Err(TemplateError::render(format!(
                "cannot load template '{}': no template loader configured",
                name
            ))),
        }
    }
}
