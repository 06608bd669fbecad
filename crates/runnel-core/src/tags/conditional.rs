//! Conditional tags: `if` / `elsif` / `else`, `unless`, `case` / `when`.
//!
//! Branch conditions are value expressions and evaluate synchronously; the
//! chosen branch's body renders through the normal (suspension-capable) node
//! walk. None of these tags push a scope frame — an `assign` inside a
//! conditional stays visible after it, matching the established template-
//! language behavior.

use futures::future::BoxFuture;

use crate::ast::Node;
use crate::error::TemplateError;
use crate::render::{RenderFlow, Renderer};
use crate::scope::Scope;
use crate::syntax::{self, Cursor, Expression, Sym};
use crate::tag::{TagHandler, TagInput, TagRenderer, TagSpec};

use super::expect_end;

/// `{% if cond %} ... {% elsif cond %} ... {% else %} ... {% endif %}`
pub struct IfTag;

impl TagHandler for IfTag {
    fn spec(&self) -> TagSpec {
        TagSpec::block("endif", &["elsif", "else"])
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let (arms, fallback) = parse_arms(input, false)?;
        Ok(Box::new(ConditionalRenderer { arms, fallback }))
    }
}

/// `{% unless cond %} ... {% else %} ... {% endunless %}` — renders its body
/// when the condition is falsy.
pub struct UnlessTag;

impl TagHandler for UnlessTag {
    fn spec(&self) -> TagSpec {
        TagSpec::block("endunless", &["else"])
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let (arms, fallback) = parse_arms(input, true)?;
        Ok(Box::new(ConditionalRenderer { arms, fallback }))
    }
}

struct Arm {
    condition: Expression,
    negate: bool,
    nodes: Vec<Node>,
}

struct ConditionalRenderer {
    arms: Vec<Arm>,
    fallback: Option<Vec<Node>>,
}

fn parse_arms(
    input: TagInput<'_>,
    negate_first: bool,
) -> Result<(Vec<Arm>, Option<Vec<Node>>), TemplateError> {
    let mut arms = Vec::new();
    let mut fallback = None;
    for branch in input.branches {
        match &branch.marker {
            None => arms.push(Arm {
                condition: syntax::parse_expression(input.args)?,
                negate: negate_first,
                nodes: branch.nodes,
            }),
            Some(marker) if marker.name == "elsif" => {
                if fallback.is_some() {
                    return Err(TemplateError::parse(
                        "'elsif' after 'else'".to_string(),
                        marker.position,
                    ));
                }
                arms.push(Arm {
                    condition: syntax::parse_expression(&marker.args)
                        .map_err(|e| e.with_position(marker.position))?,
                    negate: false,
                    nodes: branch.nodes,
                });
            }
            Some(marker) => {
                if fallback.is_some() {
                    return Err(TemplateError::parse(
                        format!("duplicate 'else' in tag '{}'", input.name),
                        marker.position,
                    ));
                }
                fallback = Some(branch.nodes);
            }
        }
    }
    Ok((arms, fallback))
}

impl TagRenderer for ConditionalRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            for arm in &self.arms {
                let mut hit = syntax::is_truthy(&syntax::eval(&arm.condition, scope)?);
                if arm.negate {
                    hit = !hit;
                }
                if hit {
                    return rt.render_nodes(&arm.nodes, scope, out).await;
                }
            }
            if let Some(nodes) = &self.fallback {
                return rt.render_nodes(nodes, scope, out).await;
            }
            Ok(RenderFlow::Continue)
        })
    }
}

/// `{% case subject %}{% when a, b %} ... {% else %} ... {% endcase %}`
///
/// Content between `case` and the first `when` is discarded. A `when` with
/// several candidates (comma- or `or`-separated) matches if any candidate
/// equals the subject.
pub struct CaseTag;

impl TagHandler for CaseTag {
    fn spec(&self) -> TagSpec {
        TagSpec::block("endcase", &["when", "else"])
    }

    fn parse(&self, input: TagInput<'_>) -> Result<Box<dyn TagRenderer>, TemplateError> {
        let subject = syntax::parse_expression(input.args)?;
        let mut whens = Vec::new();
        let mut fallback = None;
        for branch in input.branches {
            match &branch.marker {
                // Anything before the first `when` is dead content.
                None => {}
                Some(marker) if marker.name == "when" => {
                    if fallback.is_some() {
                        return Err(TemplateError::parse(
                            "'when' after 'else'".to_string(),
                            marker.position,
                        ));
                    }
                    let candidates = parse_candidates(&marker.args)
                        .map_err(|e| e.with_position(marker.position))?;
                    whens.push((candidates, branch.nodes));
                }
                Some(marker) => {
                    if fallback.is_some() {
                        return Err(TemplateError::parse(
                            "duplicate 'else' in tag 'case'".to_string(),
                            marker.position,
                        ));
                    }
                    fallback = Some(branch.nodes);
                }
            }
        }
        Ok(Box::new(CaseRenderer {
            subject,
            whens,
            fallback,
        }))
    }
}

/// Comma- or `or`-separated candidate expressions of a `when` marker.
fn parse_candidates(raw: &str) -> Result<Vec<Expression>, TemplateError> {
    let mut cursor = Cursor::new(syntax::lex(raw)?);
    if cursor.at_end() {
        return Err(TemplateError::parse_message(
            "'when' expects at least one candidate value",
        ));
    }
    let mut candidates = Vec::new();
    loop {
        // Candidates are single values, so `or` stays a separator here
        // rather than the boolean operator.
        candidates.push(syntax::parse_unary(&mut cursor, raw)?);
        if !cursor.eat_sym(Sym::Comma) && !cursor.eat_keyword("or") {
            break;
        }
    }
    expect_end(&cursor, "when", raw)?;
    Ok(candidates)
}

struct CaseRenderer {
    subject: Expression,
    whens: Vec<(Vec<Expression>, Vec<Node>)>,
    fallback: Option<Vec<Node>>,
}

impl TagRenderer for CaseRenderer {
    fn render<'a>(
        &'a self,
        rt: &'a Renderer<'a>,
        scope: &'a mut Scope,
        out: &'a mut String,
    ) -> BoxFuture<'a, Result<RenderFlow, TemplateError>> {
        Box::pin(async move {
            let subject = syntax::eval(&self.subject, scope)?;
            for (candidates, nodes) in &self.whens {
                for candidate in candidates {
                    let value = syntax::eval(candidate, scope)?;
                    if syntax::values_equal(&subject, &value) {
                        return rt.render_nodes(nodes, scope, out).await;
                    }
                }
            }
            if let Some(nodes) = &self.fallback {
                return rt.render_nodes(nodes, scope, out).await;
            }
            Ok(RenderFlow::Continue)
        })
    }
}
