//! Build errors for machine, state and transition builders.

use crate::graph::DefinitionError;
use thiserror::Error;

/// Errors that can occur when building machines, states and transitions.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("Transition target is empty. Pass a state key, path or #id to .to(target)")]
    EmptyTarget,

    #[error("Transition is marked reenter but has no target. Call .to(target)")]
    ReenterWithoutTarget,

    #[error("State '{key}' is defined twice under the same parent")]
    DuplicateState { key: String },

    #[error("Only history states take a default target, '{key}' is not one")]
    TargetOnNonHistory { key: String },

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}
