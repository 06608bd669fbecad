//! String filters. Non-string inputs are coerced with the output
//! stringification rule first, so `{{ 42 | append: "!" }}` renders `42!`.

use serde_json::Value;

use crate::error::TemplateError;
use crate::filter::FilterRegistry;
use crate::syntax::to_display;

use super::required_arg;

pub(super) fn register(registry: &mut FilterRegistry) -> Result<(), TemplateError> {
    registry.register_fn("upcase", |input, _| {
        Ok(Value::String(to_display(&input).to_uppercase()))
    })?;

    registry.register_fn("downcase", |input, _| {
        Ok(Value::String(to_display(&input).to_lowercase()))
    })?;

    registry.register_fn("capitalize", |input, _| {
        let text = to_display(&input);
        let mut chars = text.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        };
        Ok(Value::String(capitalized))
    })?;

    registry.register_fn("append", |input, args| {
        let suffix = to_display(required_arg(args, 0)?);
        Ok(Value::String(to_display(&input) + &suffix))
    })?;

    registry.register_fn("prepend", |input, args| {
        let prefix = to_display(required_arg(args, 0)?);
        Ok(Value::String(prefix + &to_display(&input)))
    })?;

    registry.register_fn("replace", |input, args| {
        let from = to_display(required_arg(args, 0)?);
        let to = to_display(required_arg(args, 1)?);
        Ok(Value::String(to_display(&input).replace(&from, &to)))
    })?;

    registry.register_fn("remove", |input, args| {
        let from = to_display(required_arg(args, 0)?);
        Ok(Value::String(to_display(&input).replace(&from, "")))
    })?;

    registry.register_fn("split", |input, args| {
        let sep = to_display(required_arg(args, 0)?);
        let text = to_display(&input);
        let parts: Vec<Value> = if sep.is_empty() {
            text.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            text.split(&sep).map(|p| Value::String(p.to_string())).collect()
        };
        Ok(Value::Array(parts))
    })?;

    registry.register_fn("strip", |input, _| {
        Ok(Value::String(to_display(&input).trim().to_string()))
    })?;

    registry.register_fn("lstrip", |input, _| {
        Ok(Value::String(to_display(&input).trim_start().to_string()))
    })?;

    registry.register_fn("rstrip", |input, _| {
        Ok(Value::String(to_display(&input).trim_end().to_string()))
    })?;

    registry.register_fn("truncate", |input, args| {
        let max = args.first().and_then(Value::as_u64).unwrap_or(50) as usize;
        let ellipsis = args.get(1).map(to_display).unwrap_or_else(|| "...".into());
        Ok(Value::String(truncate_chars(&to_display(&input), max, &ellipsis)))
    })?;

    registry.register_fn("truncatewords", |input, args| {
        let max = args.first().and_then(Value::as_u64).unwrap_or(15) as usize;
        let ellipsis = args.get(1).map(to_display).unwrap_or_else(|| "...".into());
        let text = to_display(&input);
        let words: Vec<&str> = text.split_whitespace().collect();
        let out = if words.len() > max {
            words[..max].join(" ") + &ellipsis
        } else {
            text
        };
        Ok(Value::String(out))
    })?;

    registry.register_fn("escape", |input, _| {
        Ok(Value::String(escape_html(&to_display(&input))))
    })?;

    Ok(())
}

/// Truncates so that the result, ellipsis included, is at most `max` chars.
fn truncate_chars(text: &str, max: usize, ellipsis: &str) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(ellipsis.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ellipsis);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
