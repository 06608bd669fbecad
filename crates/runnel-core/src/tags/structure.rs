//! Structural tags: `raw`, `comment`, `include`, `layout`.
//!
//! `include` and `layout` are the two built-ins that use the renderer's
//! load-related-template capability; their load is a suspension point, the
//! same one an asynchronous filter uses.

use futures::future::BoxFuture;

use crate::ast::Node;
use crate::error::TemplateError;
use crate::render::{RenderFlow, Renderer};
use crate::scope::Scope;
use crate::syntax::{self, Cursor, Expression};
use crate::tag::{TagHandler, TagInput, TagRenderer, TagSpec};

use super::expect_end;

/// `{% raw %} ... {% endraw %}` — the body is kept verbatim; output and tag
/// delimiters inside it are never interpreted.
pub struct RawTag;

impl TagHandler for RawTag {
    fn spec(&self) -> TagSpec {
        TagSpec::verbatim_block("endraw")
    }

    fn parse(&self, mut input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let body = verbatim_body(&mut input);
        Ok(Box::new(RawRenderer { body }))
    }
}

struct RawRenderer {
    body: String,
}

impl TagRenderer for RawRenderer {
    fn render<'a>(
        &'a self,
        _rt: &'a Renderer<'a>,
        _scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            out.push_str(&self.body);
            Ok(RenderFlow::Continue)
        })
    }
}

/// `{% comment %} ... {% endcomment %}` — the body is discarded entirely.
pub struct CommentTag;

impl TagHandler for CommentTag {
    fn spec(&self) -> TagSpec {
        TagSpec::verbatim_block("endcomment")
    }

    fn parse(&self, _input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        Ok(Box::new(CommentRenderer))
    }
}

struct CommentRenderer;

impl TagRenderer for CommentRenderer {
    fn render<'a>(
        &'a self,
        _rt: &'a Renderer<'a>,
        _scope: &'a mut Scope,
        _out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(futures::future::ready(Ok(RenderFlow::Continue)))
    }
}

fn verbatim_body(input: &mut TagInput<'_>) -> String {
    let nodes = input.branches.pop().map(|b| b.nodes).unwrap_or_default();
    nodes
        .into_iter()
        .map(|node| match node {
            Node::Literal(text) => text,
            _ => String::new(),
        })
        .collect()
}

/// `{% include "partial" %}` or `{% include "partial" with value %}`.
///
/// Loads the named template through the engine's loader and renders it
/// against the current scope, inside a fresh frame so its `assign`s do not
/// leak out. With `with`, the evaluated value is bound under the included
/// template's stem name (`products/card` binds `card`).
pub struct IncludeTag;

impl TagHandler for IncludeTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let raw = input.args;
        let mut cursor = Cursor::new(syntax::lex(raw)?);
        if cursor.at_end() {
            return Err(TemplateError::parse_message(
                "tag 'include' expects a template name",
            ));
        }
        let name = syntax::parse_or(&mut cursor, raw)?;
        let with = if cursor.eat_keyword("with") {
            Some(syntax::parse_or(&mut cursor, raw)?)
        } else {
            None
        };
        expect_end(&cursor, "include", raw)?;
        Ok(Box::new(IncludeRenderer { name, with }))
    }
}

struct IncludeRenderer {
    name: Expression,
    with: Option<Expression>,
}

/// The binding name an `include ... with` value gets: the last path segment
/// of the template name, minus any extension.
fn template_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.split('.').next().unwrap_or(base)
}

impl TagRenderer for IncludeRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let name = syntax::to_display(&syntax::eval(&self.name, scope)?);
            if name.is_empty() {
                return Err(TemplateError::render(
                    "tag 'include' evaluated to an empty template name",
                ));
            }
            let template = rt.load_template(&name).await?;

            scope.push_frame();
            if let Some(with) = &self.with {
                match syntax::eval(with, scope) {
                    Ok(value) => scope.assign(template_stem(&name).to_string(), value),
                    Err(err) => {
                        scope.pop_frame();
                        return Err(err);
                    }
                }
            }
            let result = rt.render_nodes(&template.nodes, scope, out).await;
            scope.pop_frame();
            result
        })
    }
}

/// `{% layout "wrapper" %} body {% endlayout %}`.
///
/// Renders its body to a string, loads the wrapper template, binds the
/// rendered body as `content` in a fresh frame, renders the wrapper, then
/// replaces everything produced so far with the wrapper's output and stops
/// the render — the early-termination signal carrying substituted output.
pub struct LayoutTag;

impl TagHandler for LayoutTag {
    fn spec(&self) -> TagSpec {
        TagSpec::block("endlayout", &[])
    }

    fn parse(&self, mut input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let name = syntax::parse_expression(input.args)?;
        let body = input.branches.pop().map(|b| b.nodes).unwrap_or_default();
        Ok(Box::new(LayoutRenderer { name, body }))
    }
}

struct LayoutRenderer {
    name: Expression,
    body: Vec<Node>,
}

impl TagRenderer for LayoutRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let mut body = String::new();
            let flow = rt.render_nodes(&self.body, scope, &mut body).await?;
            if flow.is_break() {
                // The body already terminated the render; its output is final.
                out.push_str(&body);
                return Ok(RenderFlow::Break);
            }

            let name = syntax::to_display(&syntax::eval(&self.name, scope)?);
            let wrapper = rt.load_template(&name).await?;

            let mut wrapped = String::new();
            scope.push_frame();
            scope.assign("content", serde_json::Value::String(body));
            let result = rt.render_nodes(&wrapper.nodes, scope, &mut wrapped).await;
            scope.pop_frame();
            result?;

            out.clear();
            out.push_str(&wrapped);
            Ok(RenderFlow::Break)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_strips_directories_and_extensions() {
        assert_eq!(template_stem("card"), "card");
        assert_eq!(template_stem("products/card"), "card");
        assert_eq!(template_stem("products/card.runnel"), "card");
    }
}
