//! Builder for constructing transitions.

use crate::builder::error::BuildError;
use crate::core::Action;
use crate::definition::{GuardConfig, OneOrMany, TransitionConfig};

/// Builder for constructing transitions with a fluent API.
#[derive(Clone, Debug, Default)]
pub struct TransitionBuilder {
    targets: Vec<String>,
    guard: Option<GuardConfig>,
    actions: Vec<Action>,
    reenter: bool,
    description: Option<String>,
}

impl TransitionBuilder {
    /// Create a new transition builder. Without a target it is targetless.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target (state key, dotted path, `.child` or `#id`).
    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Set the guard expression (optional).
    pub fn guard(mut self, guard: GuardConfig) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Guard by a named predicate from the implementation registry.
    pub fn when(self, guard: impl Into<String>) -> Self {
        self.guard(GuardConfig::Named(guard.into()))
    }

    /// Guard by the negation of a named predicate.
    pub fn unless(self, guard: impl Into<String>) -> Self {
        self.guard(GuardConfig::Not {
            not: Box::new(GuardConfig::Named(guard.into())),
        })
    }

    /// Append an action to run when the transition is taken.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Exit and re-enter the source even when the targets are its descendants.
    pub fn reenter(mut self) -> Self {
        self.reenter = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the transition.
    pub fn build(self) -> Result<TransitionConfig, BuildError> {
        if self.targets.iter().any(|target| target.trim().is_empty()) {
            return Err(BuildError::EmptyTarget);
        }
        if self.reenter && self.targets.is_empty() {
            return Err(BuildError::ReenterWithoutTarget);
        }

        Ok(TransitionConfig {
            target: OneOrMany(self.targets),
            guard: self.guard,
            actions: OneOrMany(self.actions),
            reenter: self.reenter,
            description: self.description,
        })
    }
}
