//! Actor logic available to `invoke` and `spawnChild`.

use crate::machine::Machine;
use std::collections::BTreeMap;

/// Child machines addressable by their `src` name.
#[derive(Clone, Debug, Default)]
pub struct ActorLogic {
    machines: BTreeMap<String, Machine>,
}

impl ActorLogic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, src: impl Into<String>, machine: Machine) -> Self {
        self.machines.insert(src.into(), machine);
        self
    }

    pub fn get(&self, src: &str) -> Option<&Machine> {
        self.machines.get(src)
    }

    pub fn contains(&self, src: &str) -> bool {
        self.machines.contains_key(src)
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}
