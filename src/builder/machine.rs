//! Builder for constructing machines.

use crate::builder::error::BuildError;
use crate::builder::state::StateBuilder;
use crate::builder::transition::TransitionBuilder;
use crate::core::Action;
use crate::definition::MachineConfig;
use crate::machine::Machine;
use serde_json::Value;

/// Builder for constructing machines with a fluent API.
///
/// The root state is configured directly on the machine builder.
#[derive(Clone, Debug)]
pub struct MachineBuilder {
    id: String,
    context: Value,
    version: Option<String>,
    root: StateBuilder,
}

impl MachineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: Value::Null,
            version: None,
            root: StateBuilder::new(),
        }
    }

    /// A machine whose root is a parallel state.
    pub fn parallel(id: impl Into<String>) -> Self {
        Self {
            root: StateBuilder::parallel(),
            ..Self::new(id)
        }
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.root = self.root.initial(key);
        self
    }

    pub fn state(mut self, key: impl Into<String>, state: StateBuilder) -> Self {
        self.root = self.root.state(key, state);
        self
    }

    /// Transition handled at the root, whatever state is active.
    pub fn on(mut self, event: impl Into<String>, transition: TransitionBuilder) -> Self {
        self.root = self.root.on(event, transition);
        self
    }

    pub fn entry(mut self, action: Action) -> Self {
        self.root = self.root.entry(action);
        self
    }

    pub fn exit(mut self, action: Action) -> Self {
        self.root = self.root.exit(action);
        self
    }

    /// Output reported when the machine reaches a top-level final state.
    pub fn output(mut self, output: Value) -> Self {
        self.root = self.root.output(output);
        self
    }

    /// Build the plain-data definition without compiling it.
    pub fn build_config(self) -> Result<MachineConfig, BuildError> {
        let root = self.root.build(&self.id)?;
        Ok(MachineConfig {
            id: self.id,
            context: self.context,
            version: self.version,
            root,
        })
    }

    /// Build and compile the machine.
    pub fn build(self) -> Result<Machine, BuildError> {
        let config = self.build_config()?;
        Ok(Machine::new(&config)?)
    }
}
