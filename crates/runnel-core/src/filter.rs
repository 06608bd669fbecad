//! Filter handlers and the per-engine filter registry.
//!
//! A filter is a named value transformation usable in output pipelines
//! (`{{ name | upcase }}`). Handlers return a boxed future so a filter may be
//! asynchronous; synchronous filters are registered through the
//! [`register_fn`](FilterRegistry::register_fn) closure adapter, which wraps
//! them in an already-ready future.
//!
//! Registries are owned by one engine instance and are never shared between
//! engines. Registration takes `&mut self`, rendering takes `&self`, so the
//! read-only-after-setup rule is enforced by the borrow checker.

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::TemplateError;

/// A registered filter.
///
/// `input` is the value flowing down the pipeline; `args` are the filter's
/// own arguments, already evaluated left to right.
pub trait FilterHandler: Send + Sync {
    fn apply<'a>(
        &'a self,
        input: Value,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, TemplateError>>;
}

struct FilterFn<F>(F);

impl<F> FilterHandler for FilterFn<F>
where
    F: Fn(Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync,
{
    fn apply<'a>(
        &'a self,
        input: Value,
        args: Vec<Value>,
    ) -> BoxFuture<'a, Result<Value, TemplateError>> {
        Box::pin(futures::future::ready((self.0)(input, &args)))
    }
}

/// Name-keyed set of filters for one engine instance.
#[derive(Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Box<dyn FilterHandler>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a filter. Fails with a validation error if the name is not a
    /// valid identifier or is already taken by another handler.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn FilterHandler>,
    ) -> Result<(), TemplateError> {
        let name = name.into();
        validate_registration_name(&name, "filter")?;
        if self.filters.contains_key(&name) {
            return Err(TemplateError::validation(format!(
                "filter '{}' is already registered",
                name
            )));
        }
        self.filters.insert(name, handler);
        Ok(())
    }

    /// Installs a synchronous filter from a closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), TemplateError>
    where
        F: Fn(Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync + 'static,
    {
        self.register(name, Box::new(FilterFn(f)))
    }

    pub fn get(&self, name: &str) -> Option<&dyn FilterHandler> {
        self.filters.get(name).map(|h| h.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(|s| s.as_str())
    }
}

/// Shared name rule for tag and filter registration.
pub(crate) fn validate_registration_name(name: &str, what: &str) -> Result<(), TemplateError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(TemplateError::validation(format!(
            "invalid {} name '{}': names must match [A-Za-z_][A-Za-z0-9_]*",
            what, name
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn register_and_look_up() {
        let mut registry = FilterRegistry::new();
        registry
            .register_fn("shout", |input, _| {
                Ok(json!(format!("{}!", input.as_str().unwrap_or(""))))
            })
            .unwrap();
        assert!(registry.contains("shout"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_name_is_a_validation_error() {
        let mut registry = FilterRegistry::new();
        registry.register_fn("dup", |input, _| Ok(input)).unwrap();
        let err = registry
            .register_fn("dup", |input, _| Ok(input))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("dup"));
    }

    #[test]
    fn invalid_name_is_a_validation_error() {
        let mut registry = FilterRegistry::new();
        for bad in ["", "1st", "has space", "has-dash"] {
            let err = registry.register_fn(bad, |input, _| Ok(input)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "name {:?}", bad);
        }
    }

    #[tokio::test]
    async fn sync_adapter_produces_ready_future() {
        let mut registry = FilterRegistry::new();
        registry
            .register_fn("double", |input, _| {
                Ok(json!(input.as_i64().unwrap_or(0) * 2))
            })
            .unwrap();
        let value = registry
            .get("double")
            .unwrap()
            .apply(json!(21), vec![])
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }
}
