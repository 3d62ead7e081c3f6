//! Late-bound implementations for guards, assignments, events and delays.
//!
//! Machine definitions only reference implementations by name, which keeps
//! the state node graph free of closures and serializable. The registry maps
//! those names to functions and is injected at evaluation time; see
//! [`crate::machine::Machine::provide`].

use crate::core::Event;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a user-supplied implementation.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ImplementationError {
    pub message: String,
}

impl ImplementationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Arguments handed to every implementation.
#[derive(Clone, Copy, Debug)]
pub struct EvalArgs<'a> {
    pub context: &'a Value,
    pub event: &'a Event,
    pub params: &'a Value,
}

pub type GuardFn = Arc<dyn Fn(EvalArgs<'_>) -> Result<bool, ImplementationError> + Send + Sync>;

/// Computes a context patch. Object results are merged shallowly into an
/// object context; anything else replaces the context.
pub type AssignFn = Arc<dyn Fn(EvalArgs<'_>) -> Result<Value, ImplementationError> + Send + Sync>;

pub type EventFn = Arc<dyn Fn(EvalArgs<'_>) -> Result<Event, ImplementationError> + Send + Sync>;

pub type DelayFn = Arc<dyn Fn(EvalArgs<'_>) -> Result<u64, ImplementationError> + Send + Sync>;

/// Resolves the params of a user-defined action from context and event.
pub type ParamsFn = Arc<dyn Fn(EvalArgs<'_>) -> Result<Value, ImplementationError> + Send + Sync>;

/// Named implementations used while computing transitions.
///
/// # Example
///
/// ```rust
/// use harel::registry::ImplementationRegistry;
/// use serde_json::json;
///
/// let registry = ImplementationRegistry::new()
///     .guard("isAdult", |args| Ok(args.context["age"].as_u64() >= Some(18)))
///     .assigner("birthday", |args| {
///         let age = args.context["age"].as_u64().unwrap_or(0);
///         Ok(json!({"age": age + 1}))
///     });
///
/// assert!(registry.get_guard("isAdult").is_some());
/// assert!(registry.get_guard("missing").is_none());
/// ```
#[derive(Clone, Default)]
pub struct ImplementationRegistry {
    guards: HashMap<String, GuardFn>,
    assigners: HashMap<String, AssignFn>,
    events: HashMap<String, EventFn>,
    delays: HashMap<String, DelayFn>,
    action_params: HashMap<String, ParamsFn>,
}

impl ImplementationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard<F>(mut self, name: impl Into<String>, guard: F) -> Self
    where
        F: Fn(EvalArgs<'_>) -> Result<bool, ImplementationError> + Send + Sync + 'static,
    {
        self.guards.insert(name.into(), Arc::new(guard));
        self
    }

    pub fn assigner<F>(mut self, name: impl Into<String>, assigner: F) -> Self
    where
        F: Fn(EvalArgs<'_>) -> Result<Value, ImplementationError> + Send + Sync + 'static,
    {
        self.assigners.insert(name.into(), Arc::new(assigner));
        self
    }

    pub fn event<F>(mut self, name: impl Into<String>, builder: F) -> Self
    where
        F: Fn(EvalArgs<'_>) -> Result<Event, ImplementationError> + Send + Sync + 'static,
    {
        self.events.insert(name.into(), Arc::new(builder));
        self
    }

    pub fn delay<F>(mut self, name: impl Into<String>, delay: F) -> Self
    where
        F: Fn(EvalArgs<'_>) -> Result<u64, ImplementationError> + Send + Sync + 'static,
    {
        self.delays.insert(name.into(), Arc::new(delay));
        self
    }

    /// Register a params resolver for a user-defined action type.
    pub fn action_params<F>(mut self, action_type: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(EvalArgs<'_>) -> Result<Value, ImplementationError> + Send + Sync + 'static,
    {
        self.action_params
            .insert(action_type.into(), Arc::new(resolver));
        self
    }

    pub fn get_guard(&self, name: &str) -> Option<&GuardFn> {
        self.guards.get(name)
    }

    pub fn get_assigner(&self, name: &str) -> Option<&AssignFn> {
        self.assigners.get(name)
    }

    pub fn get_event(&self, name: &str) -> Option<&EventFn> {
        self.events.get(name)
    }

    pub fn get_delay(&self, name: &str) -> Option<&DelayFn> {
        self.delays.get(name)
    }

    pub fn get_action_params(&self, action_type: &str) -> Option<&ParamsFn> {
        self.action_params.get(action_type)
    }

    /// Returns a new registry where entries of `overrides` replace ours.
    pub fn merge(&self, overrides: &ImplementationRegistry) -> Self {
        let mut merged = self.clone();
        merged.guards.extend(overrides.guards.clone());
        merged.assigners.extend(overrides.assigners.clone());
        merged.events.extend(overrides.events.clone());
        merged.delays.extend(overrides.delays.clone());
        merged.action_params.extend(overrides.action_params.clone());
        merged
    }
}

impl fmt::Debug for ImplementationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<V>(map: &HashMap<String, V>) -> Vec<&str> {
            let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        }

        f.debug_struct("ImplementationRegistry")
            .field("guards", &names(&self.guards))
            .field("assigners", &names(&self.assigners))
            .field("events", &names(&self.events))
            .field("delays", &names(&self.delays))
            .field("action_params", &names(&self.action_params))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args<'a>(context: &'a Value, event: &'a Event, params: &'a Value) -> EvalArgs<'a> {
        EvalArgs {
            context,
            event,
            params,
        }
    }

    #[test]
    fn merge_overrides_existing_entries() {
        let base = ImplementationRegistry::new()
            .guard("check", |_| Ok(false))
            .delay("slow", |_| Ok(1000));
        let overrides = ImplementationRegistry::new().guard("check", |_| Ok(true));

        let merged = base.merge(&overrides);
        let context = json!({});
        let event = Event::new("E");
        let params = Value::Null;

        let guard = merged.get_guard("check").unwrap();
        assert!(guard(args(&context, &event, &params)).unwrap());
        assert!(merged.get_delay("slow").is_some());

        // base is untouched
        let original = base.get_guard("check").unwrap();
        assert!(!original(args(&context, &event, &params)).unwrap());
    }

    #[test]
    fn implementations_see_params() {
        let registry =
            ImplementationRegistry::new().guard("above", |a| Ok(a.context["n"].as_i64() > a.params["min"].as_i64()));
        let context = json!({"n": 5});
        let event = Event::new("E");

        let guard = registry.get_guard("above").unwrap();
        assert!(guard(args(&context, &event, &json!({"min": 3}))).unwrap());
        assert!(!guard(args(&context, &event, &json!({"min": 7}))).unwrap());
    }

    #[test]
    fn debug_lists_names_only() {
        let registry = ImplementationRegistry::new().assigner("reset", |_| Ok(json!({})));
        let rendered = format!("{registry:?}");
        assert!(rendered.contains("reset"));
    }
}
