//! Collection filters, plus `default`.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::TemplateError;
use crate::filter::FilterRegistry;
use crate::syntax::{self, to_display};

use super::required_arg;

pub(super) fn register(registry: &mut FilterRegistry) -> Result<(), TemplateError> {
    registry.register_fn("first", |input, _| {
        Ok(match input {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            Value::String(s) => s
                .chars()
                .next()
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        })
    })?;

    registry.register_fn("last", |input, _| {
        Ok(match input {
            Value::Array(items) => items.into_iter().next_back().unwrap_or(Value::Null),
            Value::String(s) => s
                .chars()
                .next_back()
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Null),
            _ => Value::Null,
        })
    })?;

    registry.register_fn("size", |input, _| {
        Ok(syntax::size_of(&input).map(Value::from).unwrap_or(Value::Null))
    })?;

    registry.register_fn("join", |input, args| {
        let sep = args.first().map(to_display).unwrap_or_else(|| " ".into());
        let Value::Array(items) = input else {
            return Ok(Value::String(to_display(&input)));
        };
        let joined: Vec<String> = items.iter().map(to_display).collect();
        Ok(Value::String(joined.join(&sep)))
    })?;

    registry.register_fn("reverse", |input, _| {
        Ok(match input {
            Value::Array(mut items) => {
                items.reverse();
                Value::Array(items)
            }
            other => other,
        })
    })?;

    registry.register_fn("sort", |input, args| {
        let Value::Array(mut items) = input else {
            return Ok(input);
        };
        let key = args.first().map(to_display);
        items.sort_by(|a, b| compare(a, b, key.as_deref()));
        Ok(Value::Array(items))
    })?;

    registry.register_fn("uniq", |input, _| {
        let Value::Array(items) = input else {
            return Ok(input);
        };
        let mut seen: Vec<Value> = Vec::new();
        for item in items {
            if !seen.iter().any(|s| syntax::values_equal(s, &item)) {
                seen.push(item);
            }
        }
        Ok(Value::Array(seen))
    })?;

    registry.register_fn("map", |input, args| {
        let key = to_display(required_arg(args, 0)?);
        let Value::Array(items) = input else {
            return Ok(Value::Null);
        };
        let mapped = items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut entries) => entries.remove(&key).unwrap_or(Value::Null),
                _ => Value::Null,
            })
            .collect();
        Ok(Value::Array(mapped))
    })?;

    // `default` replaces nil, false, and empty strings/arrays.
    registry.register_fn("default", |input, args| {
        let fallback = required_arg(args, 0)?;
        let empty = match &input {
            Value::Null | Value::Bool(false) => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };
        Ok(if empty { fallback.clone() } else { input })
    })?;

    Ok(())
}

/// Sort order: numbers numerically when both sides are numbers, everything
/// else by its display form. With a key, objects sort by that property.
fn compare(a: &Value, b: &Value, key: Option<&str>) -> Ordering {
    let (a, b) = match key {
        Some(key) => (property(a, key), property(b, key)),
        None => (a.clone(), b.clone()),
    };
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => to_display(&a).cmp(&to_display(&b)),
    }
}

fn property(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(entries) => entries.get(key).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::register_defaults;
    use serde_json::json;

    async fn apply(name: &str, input: Value, args: Vec<Value>) -> Value {
        let mut registry = FilterRegistry::new();
        register_defaults(&mut registry).unwrap();
        registry.get(name).unwrap().apply(input, args).await.unwrap()
    }

    #[tokio::test]
    async fn first_and_last() {
        assert_eq!(apply("first", json!([1, 2, 3]), vec![]).await, json!(1));
        assert_eq!(apply("last", json!([1, 2, 3]), vec![]).await, json!(3));
        assert_eq!(apply("first", json!("abc"), vec![]).await, json!("a"));
        assert_eq!(apply("last", json!([]), vec![]).await, Value::Null);
    }

    #[tokio::test]
    async fn size_of_collections_and_strings() {
        assert_eq!(apply("size", json!([1, 2]), vec![]).await, json!(2));
        assert_eq!(apply("size", json!("abcd"), vec![]).await, json!(4));
        assert_eq!(apply("size", json!({"a": 1}), vec![]).await, json!(1));
        assert_eq!(apply("size", json!(7), vec![]).await, Value::Null);
    }

    #[tokio::test]
    async fn join_with_and_without_separator() {
        assert_eq!(
            apply("join", json!(["a", "b"]), vec![json!(", ")]).await,
            json!("a, b")
        );
        assert_eq!(apply("join", json!([1, 2]), vec![]).await, json!("1 2"));
    }

    #[tokio::test]
    async fn reverse_and_uniq() {
        assert_eq!(
            apply("reverse", json!([1, 2, 3]), vec![]).await,
            json!([3, 2, 1])
        );
        assert_eq!(
            apply("uniq", json!([1, 2, 1, 3, 2]), vec![]).await,
            json!([1, 2, 3])
        );
    }

    #[tokio::test]
    async fn sort_numbers_and_strings() {
        assert_eq!(
            apply("sort", json!([3, 1, 2]), vec![]).await,
            json!([1, 2, 3])
        );
        assert_eq!(
            apply("sort", json!(["b", "a", "c"]), vec![]).await,
            json!(["a", "b", "c"])
        );
    }

    #[tokio::test]
    async fn sort_by_property() {
        let input = json!([{"n": "b"}, {"n": "a"}]);
        assert_eq!(
            apply("sort", input, vec![json!("n")]).await,
            json!([{"n": "a"}, {"n": "b"}])
        );
    }

    #[tokio::test]
    async fn map_extracts_property() {
        let input = json!([{"name": "a"}, {"name": "b"}, {"other": 1}]);
        assert_eq!(
            apply("map", input, vec![json!("name")]).await,
            json!(["a", "b", null])
        );
    }

    #[tokio::test]
    async fn default_replaces_empty_shapes() {
        for empty in [json!(null), json!(false), json!(""), json!([])] {
            assert_eq!(
                apply("default", empty, vec![json!("fallback")]).await,
                json!("fallback")
            );
        }
        // Zero is not empty; truthiness and emptiness are separate rules.
        assert_eq!(apply("default", json!(0), vec![json!(9)]).await, json!(0));
    }
}
