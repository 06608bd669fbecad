//! Iteration tags: `for` and `cycle`.
//!
//! `for` pushes one scope frame per iteration holding the loop variable and
//! the `forloop` metadata object, and pops it before moving on — including
//! when the body breaks or errors, so the frame stack stays balanced on
//! every exit path.

use futures::future::BoxFuture;
use serde_json::{json, Value};

use crate::ast::Node;
use crate::error::TemplateError;
use crate::render::{RenderFlow, Renderer};
use crate::scope::Scope;
use crate::syntax::{self, Cursor, Expression, Sym};
use crate::tag::{TagHandler, TagInput, TagRenderer, TagSpec};

use super::expect_end;

/// `{% for item in collection limit: n offset: n reversed %} ... {% else %}
/// ... {% endfor %}`
///
/// The `else` branch renders when the collection yields nothing. Iterates
/// arrays element-wise, objects as `[key, value]` pairs, ranges as integers;
/// `nil` yields nothing and any other scalar yields itself once. `offset`
/// and `limit` slice in source order, then `reversed` flips the slice.
pub struct ForTag;

impl TagHandler for ForTag {
    fn spec(&self) -> TagSpec {
        TagSpec::block("endfor", &["else"])
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let raw = input.args;
        let mut cursor = Cursor::new(syntax::lex(raw)?);
        let variable = match cursor.next() {
            Some(syntax::Lex::Ident(name)) => name,
            _ => {
                return Err(TemplateError::parse_message(format!(
                    "tag 'for' expects 'variable in collection', got '{}'",
                    raw.trim()
                )));
            }
        };
        if !cursor.eat_keyword("in") {
            return Err(TemplateError::parse_message(format!(
                "tag 'for' is missing 'in' in '{}'",
                raw.trim()
            )));
        }
        let collection = syntax::parse_or(&mut cursor, raw)?;

        let mut limit = None;
        let mut offset = None;
        let mut reversed = false;
        loop {
            if cursor.eat_keyword("limit") {
                expect_colon(&mut cursor, "limit", raw)?;
                limit = Some(syntax::parse_or(&mut cursor, raw)?);
            } else if cursor.eat_keyword("offset") {
                expect_colon(&mut cursor, "offset", raw)?;
                offset = Some(syntax::parse_or(&mut cursor, raw)?);
            } else if cursor.eat_keyword("reversed") {
                reversed = true;
            } else {
                break;
            }
        }
        expect_end(&cursor, "for", raw)?;

        let mut body = Vec::new();
        let mut fallback = None;
        for branch in input.branches {
            match &branch.marker {
                None => body = branch.nodes,
                Some(marker) => {
                    if fallback.is_some() {
                        return Err(TemplateError::parse(
                            "duplicate 'else' in tag 'for'".to_string(),
                            marker.position,
                        ));
                    }
                    fallback = Some(branch.nodes);
                }
            }
        }

        Ok(Box::new(ForRenderer {
            variable,
            collection,
            limit,
            offset,
            reversed,
            body,
            fallback,
        }))
    }
}

fn expect_colon(cursor: &mut Cursor, modifier: &str, raw: &str) -> Result<(), TemplateError> {
    if cursor.eat_sym(Sym::Colon) {
        Ok(())
    } else {
        Err(TemplateError::parse_message(format!(
            "'for' modifier '{}' expects ':' in '{}'",
            modifier,
            raw.trim()
        )))
    }
}

struct ForRenderer {
    variable: String,
    collection: Expression,
    limit: Option<Expression>,
    offset: Option<Expression>,
    reversed: bool,
    body: Vec<Node>,
    fallback: Option<Vec<Node>>,
}

impl ForRenderer {
    fn items(&self, scope: &Scope) -> Result<Vec<Value>, TemplateError> {
        let collection = syntax::eval(&self.collection, scope)?;
        let mut items = match collection {
            Value::Array(items) => items,
            Value::Object(entries) => entries
                .into_iter()
                .map(|(key, value)| json!([key, value]))
                .collect(),
            Value::Null => Vec::new(),
            scalar => vec![scalar],
        };
        if let Some(offset) = &self.offset {
            let n = usize_arg(offset, scope, "offset")?;
            items.drain(..n.min(items.len()));
        }
        if let Some(limit) = &self.limit {
            let n = usize_arg(limit, scope, "limit")?;
            items.truncate(n);
        }
        if self.reversed {
            items.reverse();
        }
        Ok(items)
    }
}

fn usize_arg(expr: &Expression, scope: &Scope, what: &str) -> Result<usize, TemplateError> {
    let value = syntax::eval(expr, scope)?;
    value
        .as_i64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            TemplateError::render(format!("'for' modifier '{}' must be a non-negative number", what))
        })
}

fn forloop_value(index: usize, length: usize) -> Value {
    json!({
        "index": index + 1,
        "index0": index,
        "rindex": length - index,
        "rindex0": length - index - 1,
        "first": index == 0,
        "last": index + 1 == length,
        "length": length,
    })
}

impl TagRenderer for ForRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let items = self.items(scope)?;
            if items.is_empty() {
                if let Some(nodes) = &self.fallback {
                    return rt.render_nodes(nodes, scope, out).await;
                }
                return Ok(RenderFlow::Continue);
            }

            let length = items.len();
            for (index, item) in items.into_iter().enumerate() {
                scope.push_frame();
                scope.assign(self.variable.clone(), item);
                scope.assign("forloop", forloop_value(index, length));
                let result = rt.render_nodes(&self.body, scope, out).await;
                scope.pop_frame();
                if result?.is_break() {
                    return Ok(RenderFlow::Break);
                }
            }
            Ok(RenderFlow::Continue)
        })
    }
}

/// `{% cycle 'a', 'b' %}` or `{% cycle group: 'a', 'b' %}` — emits the next
/// candidate on each render, remembering its position in the scope's
/// registers (per render call, never on the shared AST).
pub struct CycleTag;

impl TagHandler for CycleTag {
    fn spec(&self) -> TagSpec {
        TagSpec::inline()
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let raw = input.args;
        let mut cursor = Cursor::new(syntax::lex(raw)?);
        if cursor.at_end() {
            return Err(TemplateError::parse_message(
                "tag 'cycle' expects at least one value",
            ));
        }
        let first = syntax::parse_or(&mut cursor, raw)?;
        let (group, mut candidates) = if cursor.eat_sym(Sym::Colon) {
            (Some(first), vec![syntax::parse_or(&mut cursor, raw)?])
        } else {
            (None, vec![first])
        };
        while cursor.eat_sym(Sym::Comma) {
            candidates.push(syntax::parse_or(&mut cursor, raw)?);
        }
        expect_end(&cursor, "cycle", raw)?;

        // Ungrouped cycles with the same candidate list share one counter,
        // so the register key is derived from the parsed candidates.
        let key = format!("cycle:{:?}", candidates);
        Ok(Box::new(CycleRenderer {
            group,
            candidates,
            key,
        }))
    }
}

struct CycleRenderer {
    group: Option<Expression>,
    candidates: Vec<Expression>,
    key: String,
}

impl TagRenderer for CycleRenderer {
    fn render<'a>(
        &'a self,
        _rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let key = match &self.group {
                Some(group) => {
                    let name = syntax::eval(group, scope)?;
                    format!("cycle:{}", syntax::to_display(&name))
                }
                None => self.key.clone(),
            };
            let index = scope
                .register(&key)
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            let candidate = &self.candidates[index % self.candidates.len()];
            let value = syntax::eval(candidate, scope)?;
            out.push_str(&syntax::to_display(&value));
            scope.set_register(key, json!((index + 1) % self.candidates.len()));
            Ok(RenderFlow::Continue)
        })
    }
}
