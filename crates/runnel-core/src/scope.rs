//! Chained variable-resolution context for one render call.
//!
//! A [`Scope`] is a stack of frames over a host-supplied root context. Lookup
//! walks frames innermost-to-outermost; `assign` always writes the innermost
//! frame. Block tags push a frame on entry and must pop it on every exit path,
//! break and error included — [`Scope::depth`] exists so tests can check the
//! balance.
//!
//! A binding may be *lazy*: a deferred computation that runs on first read and
//! is memoized on the binding itself, so shadowing the same name in another
//! frame never conflates two distinct lazy values.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::syntax;

/// One resolved step of a variable path. Produced by the expression
/// evaluator after dynamic index expressions have been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    Key(String),
    Index(i64),
}

struct LazyBinding {
    thunk: Box<dyn Fn() -> Value + Send + Sync>,
    cell: OnceLock<Value>,
}

impl LazyBinding {
    fn force(&self) -> &Value {
        self.cell.get_or_init(|| (self.thunk)())
    }
}

enum Binding {
    Eager(Value),
    Lazy(Arc<LazyBinding>),
}

type Frame = HashMap<String, Binding>;

/// The variable-resolution context for a single render call.
///
/// Constructed fresh per render from the host context; never shared between
/// concurrent renders.
pub struct Scope {
    frames: Vec<Frame>,
    /// Render-scoped state for stateful tags (`cycle`, `increment`). Not
    /// visible to variable resolution.
    registers: HashMap<String, Value>,
}

impl Scope {
    /// Creates a scope whose root frame holds the entries of `context`.
    ///
    /// A non-object context (including `Null`) seeds an empty root frame.
    pub fn new(context: Value) -> Self {
        let mut root = Frame::new();
        if let Value::Object(entries) = context {
            for (name, value) in entries {
                root.insert(name, Binding::Eager(value));
            }
        }
        Self {
            frames: vec![root],
            registers: HashMap::new(),
        }
    }

    /// Pushes an empty frame. Every push must be matched by exactly one
    /// [`pop_frame`](Self::pop_frame), on error and break paths too.
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    pub fn pop_frame(&mut self) {
        debug_assert!(self.frames.len() > 1, "popped the root frame");
        self.frames.pop();
    }

    /// Current frame-stack depth, for balance checks.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Binds `name` in the innermost frame.
    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        let frame = self.frames.last_mut().expect("scope has a root frame");
        frame.insert(name.into(), Binding::Eager(value));
    }

    /// Binds a deferred computation in the innermost frame. The thunk runs at
    /// most once, on first read, and the result is memoized on this binding.
    pub fn assign_lazy(
        &mut self,
        name: impl Into<String>,
        thunk: impl Fn() -> Value + Send + Sync + 'static,
    ) {
        let frame = self.frames.last_mut().expect("scope has a root frame");
        frame.insert(
            name.into(),
            Binding::Lazy(Arc::new(LazyBinding {
                thunk: Box::new(thunk),
                cell: OnceLock::new(),
            })),
        );
    }

    /// Resolves a variable path. The first step is looked up through the
    /// frames; remaining steps traverse into the resolved value. Unknown
    /// names and dead-end traversals resolve to `Null`, never an error.
    pub fn resolve(&self, steps: &[PathStep]) -> Value {
        let Some((first, rest)) = steps.split_first() else {
            return Value::Null;
        };
        let PathStep::Key(name) = first else {
            return Value::Null;
        };
        let Some(mut current) = self.lookup(name).cloned() else {
            return Value::Null;
        };
        for step in rest {
            current = traverse(&current, step);
            if current.is_null() {
                break;
            }
        }
        current
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.get(name) {
                return Some(match binding {
                    Binding::Eager(value) => value,
                    Binding::Lazy(lazy) => lazy.force(),
                });
            }
        }
        None
    }

    /// Reads a tag-state register.
    pub fn register(&self, key: &str) -> Option<&Value> {
        self.registers.get(key)
    }

    /// Writes a tag-state register.
    pub fn set_register(&mut self, key: impl Into<String>, value: Value) {
        self.registers.insert(key.into(), value);
    }
}

/// Traverses one step into a value, with the `size` / `first` / `last`
/// virtual properties. A literal key always wins over a virtual one.
fn traverse(value: &Value, step: &PathStep) -> Value {
    match step {
        PathStep::Index(index) => match value {
            Value::Array(items) => {
                let i = if *index < 0 {
                    items.len() as i64 + index
                } else {
                    *index
                };
                usize::try_from(i)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            _ => Value::Null,
        },
        PathStep::Key(key) => {
            if let Value::Object(entries) = value {
                if let Some(found) = entries.get(key) {
                    return found.clone();
                }
            }
            match key.as_str() {
                "size" => syntax::size_of(value).map(Value::from).unwrap_or(Value::Null),
                "first" => match value {
                    Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                },
                "last" => match value {
                    Value::Array(items) => items.last().cloned().unwrap_or(Value::Null),
                    _ => Value::Null,
                },
                _ => Value::Null,
            }
        }
    }
}
