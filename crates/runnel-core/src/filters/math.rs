//! Math filters. Inputs and arguments are coerced to numbers: numeric
//! strings parse, `nil` counts as zero, anything else is a render error.
//! When both operands are integers the result stays an integer —
//! `divided_by` and `modulo` are integer operations in that case.

use serde_json::Value;

use crate::error::TemplateError;
use crate::filter::FilterRegistry;
use crate::syntax::type_name;

use super::required_arg;

pub(super) fn register(registry: &mut FilterRegistry) -> Result<(), TemplateError> {
    registry.register_fn("plus", |input, args| {
        binary(&input, required_arg(args, 0)?, |a, b| a + b, |a, b| Some(a + b))
    })?;

    registry.register_fn("minus", |input, args| {
        binary(&input, required_arg(args, 0)?, |a, b| a - b, |a, b| Some(a - b))
    })?;

    registry.register_fn("times", |input, args| {
        binary(&input, required_arg(args, 0)?, |a, b| a * b, |a, b| Some(a * b))
    })?;

    registry.register_fn("divided_by", |input, args| {
        let divisor = required_arg(args, 0)?;
        if to_number(divisor)? == 0.0 {
            return Err(TemplateError::render("division by zero"));
        }
        binary(&input, divisor, |a, b| a / b, |a, b| Some(a / b))
    })?;

    registry.register_fn("modulo", |input, args| {
        let divisor = required_arg(args, 0)?;
        if to_number(divisor)? == 0.0 {
            return Err(TemplateError::render("division by zero"));
        }
        binary(&input, divisor, |a, b| a % b, |a, b| Some(a % b))
    })?;

    registry.register_fn("abs", |input, _| {
        match to_integer(&input) {
            Some(i) => Ok(Value::from(i.abs())),
            None => Ok(number(to_number(&input)?.abs())),
        }
    })?;

    registry.register_fn("ceil", |input, _| {
        Ok(Value::from(to_number(&input)?.ceil() as i64))
    })?;

    registry.register_fn("floor", |input, _| {
        Ok(Value::from(to_number(&input)?.floor() as i64))
    })?;

    registry.register_fn("round", |input, args| {
        let n = to_number(&input)?;
        let places = args.first().and_then(Value::as_u64).unwrap_or(0);
        if places == 0 {
            Ok(Value::from(n.round() as i64))
        } else {
            let scale = 10f64.powi(places as i32);
            Ok(number((n * scale).round() / scale))
        }
    })?;

    Ok(())
}

fn binary(
    input: &Value,
    arg: &Value,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, TemplateError> {
    if let (Some(a), Some(b)) = (to_integer(input), to_integer(arg)) {
        if let Some(result) = int_op(a, b) {
            return Ok(Value::from(result));
        }
    }
    Ok(number(float_op(to_number(input)?, to_number(arg)?)))
}

fn to_number(value: &Value) -> Result<f64, TemplateError> {
    match value {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s.trim().parse().map_err(|_| {
            TemplateError::render(format!("'{}' is not a number", s))
        }),
        Value::Null => Ok(0.0),
        other => Err(TemplateError::render(format!(
            "expected a number, got {}",
            type_name(other)
        ))),
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number(n: f64) -> Value {
    // Non-finite results (overflow) become Null rather than panicking.
    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::register_defaults;
    use serde_json::json;

    async fn apply(name: &str, input: Value, args: Vec<Value>) -> Result<Value, TemplateError> {
        let mut registry = FilterRegistry::new();
        register_defaults(&mut registry).unwrap();
        registry.get(name).unwrap().apply(input, args).await
    }

    #[tokio::test]
    async fn integer_arithmetic_stays_integral() {
        assert_eq!(apply("plus", json!(3), vec![json!(2)]).await.unwrap(), json!(5));
        assert_eq!(apply("minus", json!(3), vec![json!(5)]).await.unwrap(), json!(-2));
        assert_eq!(apply("times", json!(4), vec![json!(3)]).await.unwrap(), json!(12));
        assert_eq!(
            apply("divided_by", json!(7), vec![json!(2)]).await.unwrap(),
            json!(3)
        );
        assert_eq!(
            apply("modulo", json!(7), vec![json!(3)]).await.unwrap(),
            json!(1)
        );
    }

    #[tokio::test]
    async fn float_arithmetic() {
        assert_eq!(
            apply("plus", json!(1.5), vec![json!(2)]).await.unwrap(),
            json!(3.5)
        );
        assert_eq!(
            apply("divided_by", json!(7.0), vec![json!(2)]).await.unwrap(),
            json!(3.5)
        );
    }

    #[tokio::test]
    async fn numeric_strings_coerce() {
        assert_eq!(
            apply("plus", json!("3"), vec![json!("4")]).await.unwrap(),
            json!(7)
        );
    }

    #[tokio::test]
    async fn division_by_zero_errors() {
        assert!(apply("divided_by", json!(1), vec![json!(0)]).await.is_err());
        assert!(apply("modulo", json!(1), vec![json!(0)]).await.is_err());
    }

    #[tokio::test]
    async fn non_numeric_input_errors() {
        let err = apply("plus", json!([1]), vec![json!(1)]).await.unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[tokio::test]
    async fn rounding_family() {
        assert_eq!(apply("abs", json!(-4), vec![]).await.unwrap(), json!(4));
        assert_eq!(apply("ceil", json!(1.2), vec![]).await.unwrap(), json!(2));
        assert_eq!(apply("floor", json!(1.8), vec![]).await.unwrap(), json!(1));
        assert_eq!(apply("round", json!(2.5), vec![]).await.unwrap(), json!(3));
        assert_eq!(
            apply("round", json!(2.567), vec![json!(2)]).await.unwrap(),
            json!(2.57)
        );
    }
}
