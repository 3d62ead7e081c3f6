//! Guard predicates for controlling state transitions.
//!
//! Guards are compiled into a small expression tree at graph construction
//! time. Leaves reference user predicates by name; the predicates themselves
//! live in the [`ImplementationRegistry`] and are looked up while a
//! transition is being selected. Evaluation is pure: it reads context and
//! event and never mutates either.

use crate::core::Event;
use crate::engine::TransitionError;
use crate::graph::StateNodeId;
use crate::registry::{EvalArgs, ImplementationRegistry};
use serde_json::Value;
use std::collections::BTreeSet;

/// Compiled guard expression.
///
/// # Example
///
/// ```rust
/// use harel::core::{Event, Guard, GuardScope};
/// use harel::registry::ImplementationRegistry;
/// use serde_json::json;
/// use std::collections::BTreeSet;
///
/// let registry = ImplementationRegistry::new()
///     .guard("isPositive", |args| Ok(args.context["n"].as_i64() > Some(0)));
///
/// let guard = Guard::Not(Box::new(Guard::named("isPositive")));
/// let context = json!({"n": 3});
/// let event = Event::new("CHECK");
/// let active = BTreeSet::new();
/// let scope = GuardScope::new(&registry, &context, &event, &active);
///
/// assert!(!guard.evaluate(&scope).unwrap());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Guard {
    /// A user predicate with optional static params.
    Named { name: String, params: Value },
    Not(Box<Guard>),
    And(Vec<Guard>),
    Or(Vec<Guard>),
    /// True when the node is part of the configuration being left.
    StateIn(StateNodeId),
}

/// Everything a guard may look at.
#[derive(Clone, Copy, Debug)]
pub struct GuardScope<'a> {
    pub registry: &'a ImplementationRegistry,
    pub context: &'a Value,
    pub event: &'a Event,
    pub active: &'a BTreeSet<StateNodeId>,
}

impl<'a> GuardScope<'a> {
    pub fn new(
        registry: &'a ImplementationRegistry,
        context: &'a Value,
        event: &'a Event,
        active: &'a BTreeSet<StateNodeId>,
    ) -> Self {
        Self {
            registry,
            context,
            event,
            active,
        }
    }
}

impl Guard {
    pub fn named(name: impl Into<String>) -> Self {
        Guard::Named {
            name: name.into(),
            params: Value::Null,
        }
    }

    /// Evaluate the guard. `and`/`or` stop at the first operand that
    /// decides the result.
    pub fn evaluate(&self, scope: &GuardScope<'_>) -> Result<bool, TransitionError> {
        match self {
            Guard::Named { name, params } => {
                let predicate = scope.registry.get_guard(name).ok_or_else(|| {
                    TransitionError::MissingImplementation {
                        kind: "guard",
                        name: name.clone(),
                    }
                })?;
                predicate(EvalArgs {
                    context: scope.context,
                    event: scope.event,
                    params,
                })
                .map_err(|e| TransitionError::Guard {
                    guard: name.clone(),
                    message: e.message,
                })
            }
            Guard::Not(inner) => Ok(!inner.evaluate(scope)?),
            Guard::And(guards) => {
                for guard in guards {
                    if !guard.evaluate(scope)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Guard::Or(guards) => {
                for guard in guards {
                    if guard.evaluate(scope)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Guard::StateIn(node) => Ok(scope.active.contains(node)),
        }
    }

    /// Names of the user predicates this guard references.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Guard::Named { name, .. } => vec![name.as_str()],
            Guard::Not(inner) => inner.references(),
            Guard::And(guards) | Guard::Or(guards) => {
                guards.iter().flat_map(Guard::references).collect()
            }
            Guard::StateIn(_) => Vec::new(),
        }
    }
}
