//! The statechart transition engine.
//!
//! Everything in here is a pure function of a [`StateGraph`], an
//! [`ImplementationRegistry`] and a [`Snapshot`]: the engine computes the
//! next snapshot and the ordered list of actions to run, and never runs
//! them itself. The shell in [`crate::effects`] executes the actions.
//!
//! The work is split the way the algorithm is:
//! - `select`: which transitions an event enables, with conflicts removed
//! - `microstep`: exit set, entry set, history, one atomic state change
//! - `actions`: resolving declared actions into descriptors
//! - `macrostep`: running microsteps to a stable snapshot

mod actions;
mod config;
mod error;
mod macrostep;
mod microstep;
mod select;

pub use config::EngineConfig;
pub use error::TransitionError;
pub use macrostep::{MacrostepResult, Microstep};

use crate::graph::StateGraph;
use crate::registry::ImplementationRegistry;
use crate::snapshot::Snapshot;

/// Borrowed view of everything a computation needs.
#[derive(Clone, Copy)]
pub(crate) struct Engine<'a> {
    pub graph: &'a StateGraph,
    pub registry: &'a ImplementationRegistry,
    pub config: &'a EngineConfig,
}

impl<'a> Engine<'a> {
    pub(crate) fn new(
        graph: &'a StateGraph,
        registry: &'a ImplementationRegistry,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            graph,
            registry,
            config,
        }
    }

    /// Node ids are indices into one graph; a snapshot compiled from a
    /// different definition must not reach them.
    pub(crate) fn ensure_own(&self, snapshot: &Snapshot) -> Result<(), TransitionError> {
        let theirs = snapshot.graph();
        if std::ptr::eq(theirs, self.graph) || theirs == self.graph {
            return Ok(());
        }
        Err(TransitionError::ForeignSnapshot {
            machine: self.graph.machine_id().to_string(),
            found: theirs.machine_id().to_string(),
        })
    }
}
