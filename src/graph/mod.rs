//! The static state node graph.
//!
//! A [`StateGraph`] is compiled once from a [`crate::definition::MachineConfig`]
//! and never mutated afterwards. Nodes live in an arena and refer to each
//! other by [`StateNodeId`]; ids are assigned in document order (pre-order),
//! so comparing ids compares document order.

mod build;
mod error;

pub use error::DefinitionError;

use crate::core::{Action, Guard};
use crate::definition::HistoryType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Index of a state node inside its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateNodeId(pub(crate) usize);

impl StateNodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a transition inside its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransitionId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateKind::Atomic => "atomic",
            StateKind::Compound => "compound",
            StateKind::Parallel => "parallel",
            StateKind::Final => "final",
            StateKind::History => "history",
        };
        f.write_str(name)
    }
}

/// A child actor started on entry and stopped on exit.
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeDefinition {
    pub id: String,
    pub src: String,
    pub input: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TransitionDefinition {
    pub source: StateNodeId,
    /// Event descriptor; `None` for eventless transitions.
    pub event: Option<String>,
    pub guard: Option<Guard>,
    /// Ordered targets; empty for targetless transitions.
    pub targets: Vec<StateNodeId>,
    pub actions: Vec<Action>,
    pub reenter: bool,
}

impl TransitionDefinition {
    pub fn is_targetless(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateNode {
    pub id: String,
    pub key: String,
    /// Keys from the root (exclusive) down to this node.
    pub path: Vec<String>,
    pub kind: StateKind,
    pub parent: Option<StateNodeId>,
    pub children: Vec<StateNodeId>,
    /// Default child of a compound node.
    pub initial: Option<StateNodeId>,
    /// Event-triggered transitions grouped by descriptor, in document order.
    pub on: Vec<(String, Vec<TransitionId>)>,
    pub always: Vec<TransitionId>,
    pub entry: Vec<Action>,
    pub exit: Vec<Action>,
    pub invoke: Vec<InvokeDefinition>,
    pub history: Option<HistoryType>,
    /// Default targets of a history node.
    pub history_target: Vec<StateNodeId>,
    pub output: Option<Value>,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub meta: Option<Value>,
}

impl StateNode {
    /// Atomic and final nodes have no active children.
    pub fn is_atomic(&self) -> bool {
        matches!(self.kind, StateKind::Atomic | StateKind::Final)
    }

    pub fn is_history(&self) -> bool {
        self.kind == StateKind::History
    }

    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }
}

/// Compiled, immutable statechart structure.
#[derive(Clone, Debug, PartialEq)]
pub struct StateGraph {
    pub(crate) machine_id: String,
    pub(crate) nodes: Vec<StateNode>,
    pub(crate) transitions: Vec<TransitionDefinition>,
    pub(crate) ids: HashMap<String, StateNodeId>,
    pub(crate) context: Value,
}

impl StateGraph {
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Initial context declared by the definition.
    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn root(&self) -> StateNodeId {
        StateNodeId(0)
    }

    pub fn node(&self, id: StateNodeId) -> &StateNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (StateNodeId, &StateNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (StateNodeId(index), node))
    }

    pub fn transition(&self, id: TransitionId) -> &TransitionDefinition {
        &self.transitions[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by its id (without the leading `#`).
    pub fn node_by_id(&self, id: &str) -> Option<StateNodeId> {
        self.ids.get(id.trim_start_matches('#')).copied()
    }

    /// Look up a node by its key path from the root.
    pub fn node_by_path<S: AsRef<str>>(&self, path: &[S]) -> Option<StateNodeId> {
        let mut current = self.root();
        for key in path {
            current = self.child_by_key(current, key.as_ref())?;
        }
        Some(current)
    }

    pub fn child_by_key(&self, parent: StateNodeId, key: &str) -> Option<StateNodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|child| self.node(*child).key == key)
    }

    pub fn is_atomic(&self, id: StateNodeId) -> bool {
        self.node(id).is_atomic()
    }

    pub fn parent(&self, id: StateNodeId) -> Option<StateNodeId> {
        self.node(id).parent
    }

    /// Ancestors of `id` from its parent upwards, stopping before `stop_at`.
    pub fn proper_ancestors(
        &self,
        id: StateNodeId,
        stop_at: Option<StateNodeId>,
    ) -> Vec<StateNodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.node(id).parent;
        while let Some(ancestor) = current {
            if Some(ancestor) == stop_at {
                break;
            }
            ancestors.push(ancestor);
            current = self.node(ancestor).parent;
        }
        ancestors
    }

    /// True when `child` is a strict descendant of `ancestor`.
    pub fn is_descendant(&self, child: StateNodeId, ancestor: StateNodeId) -> bool {
        let mut current = self.node(child).parent;
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.node(node).parent;
        }
        false
    }

    /// Non-history children in document order.
    pub fn regions(&self, id: StateNodeId) -> impl Iterator<Item = StateNodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |child| !self.node(*child).is_history())
    }

    pub fn history_children(&self, id: StateNodeId) -> impl Iterator<Item = StateNodeId> + '_ {
        self.node(id)
            .children
            .iter()
            .copied()
            .filter(move |child| self.node(*child).is_history())
    }

    /// Resolve a target reference as seen from `source`.
    ///
    /// `#id` is absolute. `.child` is relative to `source` itself, and a
    /// plain `sibling.child` path is relative to the source's parent.
    pub fn resolve_target(&self, source: StateNodeId, target: &str) -> Result<StateNodeId, DefinitionError> {
        let unresolved = || DefinitionError::UnresolvedTarget {
            source_id: self.node(source).id.clone(),
            target: target.to_string(),
        };

        if let Some(id) = target.strip_prefix('#') {
            return self.resolve_absolute(id).ok_or_else(unresolved);
        }

        let (base, path) = match target.strip_prefix('.') {
            Some(rest) => (Some(source), rest),
            None => (self.node(source).parent, target),
        };
        let mut current = base.ok_or_else(unresolved)?;
        for key in path.split('.') {
            current = self.child_by_key(current, key).ok_or_else(unresolved)?;
        }
        Ok(current)
    }

    /// Resolve `id` or `id.child.grandchild` where `id` is a node id.
    fn resolve_absolute(&self, reference: &str) -> Option<StateNodeId> {
        if let Some(found) = self.ids.get(reference) {
            return Some(*found);
        }
        // Longest id prefix wins, the rest is a key path below it.
        let mut split = reference.len();
        while let Some(dot) = reference[..split].rfind('.') {
            if let Some(base) = self.ids.get(&reference[..dot]) {
                let mut current = *base;
                for key in reference[dot + 1..].split('.') {
                    current = self.child_by_key(current, key)?;
                }
                return Some(current);
            }
            split = dot;
        }
        None
    }

    /// Default descendants a compound node enters, down to the leaves.
    pub fn initial_leaves(&self, id: StateNodeId) -> Vec<StateNodeId> {
        let node = self.node(id);
        match node.kind {
            StateKind::Compound => match node.initial {
                Some(initial) => self.initial_leaves(initial),
                None => vec![id],
            },
            StateKind::Parallel => self
                .regions(id)
                .flat_map(|region| self.initial_leaves(region))
                .collect(),
            _ => vec![id],
        }
    }

    /// Transitions of `id` whose descriptor matches `event_type`.
    ///
    /// An exact descriptor wins outright; otherwise wildcard descriptors are
    /// tried from the most specific (longest) to the least, each keeping its
    /// declaration order.
    pub fn candidates(&self, id: StateNodeId, event_type: &str) -> Vec<TransitionId> {
        let node = self.node(id);
        if let Some((_, exact)) = node.on.iter().find(|(descriptor, _)| descriptor == event_type) {
            return exact.clone();
        }

        let mut partial: Vec<&(String, Vec<TransitionId>)> = node
            .on
            .iter()
            .filter(|(descriptor, _)| {
                crate::core::event::is_wildcard_descriptor(descriptor)
                    && crate::core::event::descriptor_matches(descriptor, event_type)
            })
            .collect();
        // stable sort keeps declaration order between equal lengths
        partial.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        partial
            .into_iter()
            .flat_map(|(_, transitions)| transitions.iter().copied())
            .collect()
    }

    /// All event descriptors the machine handles, in document order.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = Vec::new();
        for node in &self.nodes {
            for (descriptor, _) in &node.on {
                if !events.contains(&descriptor.as_str()) {
                    events.push(descriptor);
                }
            }
        }
        events
    }
}
