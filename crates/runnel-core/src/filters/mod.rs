//! Built-in filter library.
//!
//! All built-ins are synchronous and register through the same
//! [`register_fn`](crate::filter::FilterRegistry::register_fn) adapter user
//! filters use. Behavior is pinned by the tests in each submodule rather
//! than by any external compatibility contract.

mod collection;
mod math;
mod string;

use serde_json::Value;

use crate::error::TemplateError;
use crate::filter::FilterRegistry;

/// Installs the built-in filters into a registry.
pub fn register_defaults(registry: &mut FilterRegistry) -> Result<(), TemplateError> {
    string::register(registry)?;
    math::register(registry)?;
    collection::register(registry)?;
    Ok(())
}

/// Required positional argument, or a render error the pipeline prefixes
/// with the filter's name.
fn required_arg(args: &[Value], index: usize) -> Result<&Value, TemplateError> {
    args.get(index)
        .ok_or_else(|| TemplateError::render(format!("missing argument {}", index + 1)))
}
