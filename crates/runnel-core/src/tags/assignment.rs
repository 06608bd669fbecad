//! Variable assignment tags: `assign`, `capture`, `increment`, `decrement`.

use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::ast::Node;
use crate::error::TemplateError;
use crate::render::{RenderFlow, Renderer};
use crate::scope::Scope;
use crate::syntax::{self, OutputExpr};
use crate::tag::{TagHandler, TagInput, TagRenderer, TagSpec};

use super::single_ident;

/// `{% assign name = value | filters %}` — binds in the innermost frame.
/// The right-hand side is a full output expression, filters included, so
/// assignment can suspend on an asynchronous filter.
pub struct AssignTag;

impl TagHandler for AssignTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let Some((lhs, rhs)) = input.args.split_once('=') else {
            return Err(TemplateError::parse_message(format!(
                "tag 'assign' expects 'name = value', got '{}'",
                input.args.trim()
            )));
        };
        let name = single_ident(lhs, "assign")?;
        let value = syntax::parse_output(rhs)?;
        Ok(Box::new(AssignRenderer { name, value }))
    }
}

struct AssignRenderer {
    name: String,
    value: OutputExpr,
}

impl TagRenderer for AssignRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        _out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let value = syntax::eval_output(&self.value, scope, rt.filters()).await?;
            scope.assign(self.name.clone(), value);
            Ok(RenderFlow::Continue)
        })
    }
}

/// `{% capture name %} ... {% endcapture %}` — renders its body into a
/// string and binds it, emitting nothing itself.
pub struct CaptureTag;

impl TagHandler for CaptureTag {
    fn spec(&self) -> TagSpec {
        TagSpec::block("endcapture", &[])
    }

    fn parse(&self, mut input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let name = single_ident(input.args, "capture")?;
        let body = input.branches.pop().map(|b| b.nodes).unwrap_or_default();
        Ok(Box::new(CaptureRenderer { name, body }))
    }
}

struct CaptureRenderer {
    name: String,
    body: Vec<Node>,
}

impl TagRenderer for CaptureRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        _out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let mut captured = String::new();
            let flow = rt.render_nodes(&self.body, scope, &mut captured).await?;
            scope.assign(self.name.clone(), Value::String(captured));
            Ok(flow)
        })
    }
}

/// `{% increment name %}` — emits the counter's current value, then adds
/// one. Counters live in the scope's registers, independent of `assign`ed
/// variables, and are shared with `decrement`.
pub struct IncrementTag;

impl TagHandler for IncrementTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        Ok(Box::new(CounterRenderer {
            key: counter_key(&single_ident(input.args, "increment")?),
            step: 1,
        }))
    }
}

/// `{% decrement name %}` — subtracts one, then emits the new value (so the
/// first render emits `-1`).
pub struct DecrementTag;

impl TagHandler for DecrementTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        Ok(Box::new(CounterRenderer {
            key: counter_key(&single_ident(input.args, "decrement")?),
            step: -1,
        }))
    }
}

fn counter_key(name: &str) -> String {
    format!("counter:{}", name)
}

struct CounterRenderer {
    key: String,
    step: i64,
}

impl TagRenderer for CounterRenderer {
    fn render<'a>(
        &'a self,
        _rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let current = scope
                .register(&self.key)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let emitted = if self.step > 0 { current } else { current - 1 };
            out.push_str(&emitted.to_string());
            scope.set_register(self.key.clone(), json!(current + self.step));
            Ok(RenderFlow::Continue)
        })
    }
}
