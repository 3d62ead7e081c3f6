//! Checkpoint and resume functionality for machine snapshots.
//!
//! A checkpoint wraps a [`PersistedSnapshot`] with the metadata needed to
//! restore it safely, enabling long-running actors to survive process
//! restarts.
//!
//! # Example
//!
//! ```rust
//! use harel::checkpoint::Checkpoint;
//! use harel::machine::Machine;
//! use serde_json::json;
//!
//! let machine = Machine::from_json(json!({
//!     "id": "job",
//!     "initial": "queued",
//!     "states": {"queued": {"on": {"RUN": "running"}}, "running": {}}
//! })).unwrap();
//!
//! let (snapshot, _) = machine.initial_transition(None).unwrap();
//! let (snapshot, _) = machine.transition(&snapshot, "RUN").unwrap();
//!
//! let bytes = Checkpoint::new(&snapshot).to_binary().unwrap();
//! let restored = Checkpoint::from_binary(&bytes).unwrap().restore(&machine).unwrap();
//! assert!(restored.matches("running"));
//! ```

use crate::machine::Machine;
use crate::snapshot::{PersistedSnapshot, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;

pub use error::CheckpointError;

/// Version identifier for checkpoint format
pub const CHECKPOINT_VERSION: u32 = 1;

/// Serializable checkpoint of an actor's snapshot.
/// Does NOT include implementations (not serializable).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Checkpoint format version
    pub version: u32,

    /// Unique checkpoint identifier
    pub id: String,

    /// When checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Id of the machine the snapshot belongs to
    pub machine_id: String,

    pub snapshot: PersistedSnapshot,
}

/// Binary layout: bincode header around the JSON-encoded checkpoint.
/// Context values are dynamically typed, which bincode cannot describe.
#[derive(Serialize, Deserialize)]
struct BinaryEnvelope {
    version: u32,
    payload: String,
}

impl Checkpoint {
    pub fn new(snapshot: &Snapshot) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            machine_id: snapshot.graph().machine_id().to_string(),
            snapshot: snapshot.persisted(),
        }
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        serde_json::to_string_pretty(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        let checkpoint: Checkpoint =
            serde_json::from_str(json).map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        checkpoint.check_version()?;
        Ok(checkpoint)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, CheckpointError> {
        let payload =
            serde_json::to_string(self).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))?;
        let envelope = BinaryEnvelope {
            version: self.version,
            payload,
        };
        bincode::serialize(&envelope).map_err(|e| CheckpointError::SerializationFailed(e.to_string()))
    }

    pub fn from_binary(bytes: &[u8]) -> Result<Self, CheckpointError> {
        let envelope: BinaryEnvelope =
            bincode::deserialize(bytes).map_err(|e| CheckpointError::DeserializationFailed(e.to_string()))?;
        if envelope.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: envelope.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Self::from_json(&envelope.payload)
    }

    /// Rebuild the snapshot against `machine`.
    pub fn restore(&self, machine: &Machine) -> Result<Snapshot, CheckpointError> {
        self.check_version()?;
        if self.machine_id != machine.id() {
            return Err(CheckpointError::MachineMismatch {
                expected: machine.id().to_string(),
                found: self.machine_id.clone(),
            });
        }
        let snapshot = machine.resolve_state(&self.snapshot)?;
        tracing::debug!(
            checkpoint = %self.id,
            machine = %self.machine_id,
            "restored checkpoint"
        );
        Ok(snapshot)
    }

    fn check_version(&self) -> Result<(), CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                supported: CHECKPOINT_VERSION,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine() -> Machine {
        Machine::from_json(json!({
            "id": "order",
            "context": {"items": 0},
            "initial": "cart",
            "states": {
                "cart": {
                    "initial": "empty",
                    "states": {"empty": {"on": {"ADD": "filled"}}, "filled": {}},
                    "on": {"PAY": "paid"}
                },
                "paid": {"type": "final"}
            }
        }))
        .unwrap()
    }

    fn filled(machine: &Machine) -> Snapshot {
        let (snapshot, _) = machine.initial_transition(None).unwrap();
        machine.transition(&snapshot, "ADD").unwrap().0
    }

    #[test]
    fn json_round_trip_restores_snapshot() {
        let machine = machine();
        let snapshot = filled(&machine);
        let checkpoint = Checkpoint::new(&snapshot);

        let json = checkpoint.to_json().unwrap();
        let restored = Checkpoint::from_json(&json).unwrap();
        assert_eq!(restored, checkpoint);
        assert_eq!(restored.restore(&machine).unwrap(), snapshot);
    }

    #[test]
    fn binary_round_trip_restores_snapshot() {
        let machine = machine();
        let snapshot = filled(&machine);
        let bytes = Checkpoint::new(&snapshot).to_binary().unwrap();

        let restored = Checkpoint::from_binary(&bytes).unwrap().restore(&machine).unwrap();
        assert!(restored.matches("cart.filled"));
        let (next, _) = machine.transition(&restored, "PAY").unwrap();
        assert!(next.matches("paid"));
    }

    #[test]
    fn checkpoints_have_unique_ids() {
        let machine = machine();
        let snapshot = filled(&machine);
        assert_ne!(Checkpoint::new(&snapshot).id, Checkpoint::new(&snapshot).id);
    }

    #[test]
    fn rejects_unsupported_version() {
        let machine = machine();
        let mut checkpoint = Checkpoint::new(&filled(&machine));
        checkpoint.version = 99;
        let json = serde_json::to_string(&checkpoint).unwrap();

        let result = Checkpoint::from_json(&json);
        assert!(matches!(
            result,
            Err(CheckpointError::UnsupportedVersion { found: 99, supported: 1 })
        ));
    }

    #[test]
    fn rejects_other_machines() {
        let checkpoint = Checkpoint::new(&filled(&machine()));
        let other = Machine::from_json(json!({"id": "other", "initial": "cart", "states": {"cart": {}}})).unwrap();

        let result = checkpoint.restore(&other);
        assert!(matches!(result, Err(CheckpointError::MachineMismatch { .. })));
    }

    #[test]
    fn rejects_corrupt_binary() {
        let result = Checkpoint::from_binary(&[1, 2, 3]);
        assert!(matches!(result, Err(CheckpointError::DeserializationFailed(_))));
    }

    #[test]
    fn rejects_snapshots_that_do_not_fit() {
        let machine = machine();
        let mut checkpoint = Checkpoint::new(&filled(&machine));
        checkpoint.snapshot.value = "nowhere".into();

        let result = checkpoint.restore(&machine);
        assert!(matches!(result, Err(CheckpointError::ValidationFailed(_))));
    }
}
