//! The machine facade: a compiled definition plus its implementations.
//!
//! A [`Machine`] is cheap to clone and immutable. All transition methods are
//! pure: they take a snapshot and return a new one together with the
//! actions to execute, and never call user actions themselves.
//!
//! # Example
//!
//! ```rust
//! use harel::machine::Machine;
//! use serde_json::json;
//!
//! let machine = Machine::from_json(json!({
//!     "id": "light",
//!     "initial": "green",
//!     "states": {
//!         "green": {"on": {"TIMER": "yellow"}},
//!         "yellow": {"on": {"TIMER": "red"}},
//!         "red": {"on": {"TIMER": "green"}}
//!     }
//! })).unwrap();
//!
//! let (snapshot, _) = machine.initial_transition(None).unwrap();
//! assert!(snapshot.matches("green"));
//!
//! let (snapshot, _) = machine.transition(&snapshot, "TIMER").unwrap();
//! assert!(snapshot.matches("yellow"));
//! ```

use crate::core::{ActionDescriptor, Event};
use crate::definition::MachineConfig;
use crate::engine::{Engine, EngineConfig, MacrostepResult, Microstep, TransitionError};
use crate::graph::{DefinitionError, StateGraph};
use crate::registry::ImplementationRegistry;
use crate::snapshot::{PersistedSnapshot, Snapshot, SnapshotError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct Machine {
    graph: Arc<StateGraph>,
    implementations: ImplementationRegistry,
    config: EngineConfig,
}

impl Machine {
    /// Compile and validate a definition.
    pub fn new(definition: &MachineConfig) -> Result<Self, DefinitionError> {
        let graph = StateGraph::build(definition)?;
        tracing::debug!(
            machine = %graph.machine_id(),
            states = graph.len(),
            "compiled machine definition"
        );
        Ok(Self {
            graph: Arc::new(graph),
            implementations: ImplementationRegistry::new(),
            config: EngineConfig::default(),
        })
    }

    pub fn from_json(definition: Value) -> Result<Self, DefinitionError> {
        let config = MachineConfig::from_json(definition).map_err(|e| DefinitionError::Malformed {
            reason: e.to_string(),
        })?;
        Self::new(&config)
    }

    pub fn from_json_str(definition: &str) -> Result<Self, DefinitionError> {
        let config = MachineConfig::from_json_str(definition).map_err(|e| DefinitionError::Malformed {
            reason: e.to_string(),
        })?;
        Self::new(&config)
    }

    /// A machine sharing this graph, with `implementations` layered over
    /// the current ones.
    pub fn provide(&self, implementations: ImplementationRegistry) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            implementations: self.implementations.merge(&implementations),
            config: self.config.clone(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> &str {
        self.graph.machine_id()
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn implementations(&self) -> &ImplementationRegistry {
        &self.implementations
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn engine(&self) -> Engine<'_> {
        Engine::new(&self.graph, &self.implementations, &self.config)
    }

    /// The first snapshot and the actions entering it produced. `input` is
    /// available to implementations as the `input` field of the
    /// `xstate.init` event.
    pub fn initial_transition(
        &self,
        input: Option<Value>,
    ) -> Result<(Snapshot, Vec<ActionDescriptor>), TransitionError> {
        let result = self.initial_macrostep(input)?;
        Ok((result.snapshot, result.actions))
    }

    pub fn initial_macrostep(&self, input: Option<Value>) -> Result<MacrostepResult, TransitionError> {
        self.engine().initial_macrostep(Arc::clone(&self.graph), input)
    }

    /// The next stable snapshot for `event` and the actions to execute.
    pub fn transition(
        &self,
        snapshot: &Snapshot,
        event: impl Into<Event>,
    ) -> Result<(Snapshot, Vec<ActionDescriptor>), TransitionError> {
        let result = self.macrostep(snapshot, event)?;
        Ok((result.snapshot, result.actions))
    }

    /// Like [`Machine::transition`], with every intermediate microstep.
    pub fn macrostep(
        &self,
        snapshot: &Snapshot,
        event: impl Into<Event>,
    ) -> Result<MacrostepResult, TransitionError> {
        self.engine().macrostep(snapshot, &event.into())
    }

    pub fn microsteps(
        &self,
        snapshot: &Snapshot,
        event: impl Into<Event>,
    ) -> Result<Vec<Microstep>, TransitionError> {
        Ok(self.macrostep(snapshot, event)?.microsteps)
    }

    /// Whether `event` would enable a transition that changes state or runs
    /// actions.
    pub fn can(&self, snapshot: &Snapshot, event: impl Into<Event>) -> Result<bool, TransitionError> {
        self.engine().ensure_own(snapshot)?;
        if !snapshot.is_active() {
            return Ok(false);
        }
        let event = event.into();
        let enabled = self.engine().select_transitions(snapshot, &event)?;
        Ok(enabled.into_iter().any(|id| {
            let transition = self.graph.transition(id);
            !transition.is_targetless() || !transition.actions.is_empty()
        }))
    }

    /// Rebuild a snapshot from persisted data.
    pub fn resolve_state(&self, persisted: &PersistedSnapshot) -> Result<Snapshot, SnapshotError> {
        Snapshot::resolve(Arc::clone(&self.graph), persisted)
    }

    pub fn resolve_state_json(&self, persisted: Value) -> Result<Snapshot, SnapshotError> {
        self.resolve_state(&PersistedSnapshot::from_json(persisted)?)
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.graph.machine_id())
            .field("states", &self.graph.len())
            .field("implementations", &self.implementations)
            .field("config", &self.config)
            .finish()
    }
}
