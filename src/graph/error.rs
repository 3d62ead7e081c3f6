//! Definition errors raised while building the state node graph.

use thiserror::Error;

/// Errors that make a machine definition unusable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DefinitionError {
    #[error("target '{target}' referenced from '{source_id}' does not exist")]
    UnresolvedTarget { source_id: String, target: String },

    #[error("duplicate state id '{id}'")]
    DuplicateStateId { id: String },

    #[error("history state '{id}' has no default target and its parent has no initial state")]
    MalformedHistory { id: String },

    #[error("initial state '{initial}' is not a child of '{state_id}'")]
    InvalidInitial { state_id: String, initial: String },

    #[error("compound state '{state_id}' has no child that can be entered")]
    MissingInitial { state_id: String },

    #[error("state '{state_id}' is invalid: {reason}")]
    InvalidState { state_id: String, reason: String },

    #[error("invalid '{action_type}' action: {reason}")]
    InvalidAction { action_type: String, reason: String },

    #[error("machine definition is malformed: {reason}")]
    Malformed { reason: String },

    #[error("machine definition is invalid: {}", join(.0))]
    Invalid(Vec<DefinitionError>),
}

fn join(errors: &[DefinitionError]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors: {}", errors.len(), messages.join("; "))
}

impl DefinitionError {
    /// Flatten into the individual problems.
    pub fn errors(&self) -> Vec<&DefinitionError> {
        match self {
            DefinitionError::Invalid(errors) => errors.iter().flat_map(|e| e.errors()).collect(),
            other => vec![other],
        }
    }
}
