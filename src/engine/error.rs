//! Run-time errors raised while computing a transition.

use thiserror::Error;

/// Errors that abort a transition computation.
///
/// The snapshot passed in is never modified, so it remains the state of
/// record when one of these is returned.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransitionError {
    #[error("guard '{guard}' failed: {message}")]
    Guard { guard: String, message: String },

    #[error("action '{action_type}' failed: {message}")]
    Action { action_type: String, message: String },

    #[error("no {kind} implementation registered under '{name}'")]
    MissingImplementation { kind: &'static str, name: String },

    #[error("eventless transitions did not settle within {limit} microsteps")]
    NonterminatingEventlessCycle { limit: usize },

    #[error("snapshot of machine '{found}' does not belong to machine '{machine}'")]
    ForeignSnapshot { machine: String, found: String },
}
