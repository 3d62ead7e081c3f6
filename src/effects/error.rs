//! Actor shell errors.

use crate::engine::TransitionError;
use thiserror::Error;

/// Errors raised while running an actor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActorError {
    #[error("Actor '{id}' has already been started")]
    AlreadyStarted { id: String },

    #[error("Actor '{id}' is not running")]
    NotRunning { id: String },

    #[error("No actor logic registered for '{src}'")]
    MissingLogic { src: String },

    #[error("Action '{action_type}' failed: {message}")]
    ExecutionFailed { action_type: String, message: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl ActorError {
    /// Failure of a user action executor.
    pub fn execution_failed(action_type: impl Into<String>, message: impl Into<String>) -> Self {
        ActorError::ExecutionFailed {
            action_type: action_type.into(),
            message: message.into(),
        }
    }
}
