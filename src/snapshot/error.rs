//! Snapshot restoration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The persisted data does not describe a valid configuration of the machine.
    #[error("snapshot cannot be resolved against machine '{machine_id}': {reason}")]
    UnresolvableSnapshot { machine_id: String, reason: String },

    #[error("snapshot JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
}
