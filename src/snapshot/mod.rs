//! Immutable machine snapshots and their persisted form.
//!
//! A [`Snapshot`] is the complete state of one machine instance at a point
//! in time: the active configuration, the extended context, status, output,
//! child references and recorded history. The engine never modifies a
//! snapshot; each step produces a new one, so old snapshots stay valid for
//! replay.
//!
//! [`PersistedSnapshot`] is the plain-data shape used for storage:
//!
//! ```json
//! {"value": {"a": "b"}, "context": {}, "status": "active", "children": {}}
//! ```

mod error;
mod resolve;

pub use error::SnapshotError;

use crate::core::{matches_state, HistoryValue, StateValue};
use crate::graph::{StateGraph, StateKind, StateNodeId};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    #[default]
    Active,
    Done,
    Error,
    Stopped,
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotStatus::Active => "active",
            SnapshotStatus::Done => "done",
            SnapshotStatus::Error => "error",
            SnapshotStatus::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Opaque reference to a spawned or invoked child actor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub id: String,
    pub src: String,
}

/// Plain-data form of a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    pub value: StateValue,

    #[serde(default)]
    pub context: Value,

    #[serde(default)]
    pub status: SnapshotStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    #[serde(default)]
    pub children: BTreeMap<String, ChildRef>,

    /// History node id → recorded node ids.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub history_value: BTreeMap<String, Vec<String>>,
}

impl PersistedSnapshot {
    pub fn to_json(&self) -> Result<Value, SnapshotError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(value: Value) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_value(value)?)
    }
}

/// State of one machine instance.
#[derive(Clone)]
pub struct Snapshot {
    pub(crate) graph: Arc<StateGraph>,
    /// Every active node, ancestors included.
    pub(crate) nodes: BTreeSet<StateNodeId>,
    pub(crate) context: Value,
    pub(crate) status: SnapshotStatus,
    pub(crate) output: Option<Value>,
    pub(crate) error: Option<Value>,
    pub(crate) children: BTreeMap<String, ChildRef>,
    pub(crate) history: HistoryValue,
}

impl Snapshot {
    /// An empty configuration, before the initial transition has run.
    pub(crate) fn pre_initial(graph: Arc<StateGraph>, context: Value) -> Self {
        Self {
            graph,
            nodes: BTreeSet::new(),
            context,
            status: SnapshotStatus::Active,
            output: None,
            error: None,
            children: BTreeMap::new(),
            history: HistoryValue::new(),
        }
    }

    pub(crate) fn resolve(
        graph: Arc<StateGraph>,
        persisted: &PersistedSnapshot,
    ) -> Result<Self, SnapshotError> {
        resolve::resolve(graph, persisted)
    }

    pub fn graph(&self) -> &StateGraph {
        &self.graph
    }

    pub fn context(&self) -> &Value {
        &self.context
    }

    pub fn status(&self) -> SnapshotStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == SnapshotStatus::Active
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    pub fn children(&self) -> &BTreeMap<String, ChildRef> {
        &self.children
    }

    pub fn history_value(&self) -> &HistoryValue {
        &self.history
    }

    /// All active nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = StateNodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn is_active_node(&self, id: StateNodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Active atomic nodes in document order.
    pub fn configuration(&self) -> Vec<StateNodeId> {
        self.nodes
            .iter()
            .copied()
            .filter(|id| self.graph.is_atomic(*id))
            .collect()
    }

    /// Ids of the active atomic nodes.
    pub fn configuration_ids(&self) -> Vec<&str> {
        self.configuration()
            .into_iter()
            .map(|id| self.graph.node(id).id.as_str())
            .collect()
    }

    /// The nested state value of the active configuration.
    pub fn value(&self) -> StateValue {
        self.value_of(self.graph.root())
    }

    fn value_of(&self, id: StateNodeId) -> StateValue {
        let graph = &self.graph;
        match graph.node(id).kind {
            StateKind::Compound => {
                match graph.regions(id).find(|child| self.nodes.contains(child)) {
                    Some(child) if graph.is_atomic(child) => {
                        StateValue::Leaf(graph.node(child).key.clone())
                    }
                    Some(child) => StateValue::Branch(BTreeMap::from([(
                        graph.node(child).key.clone(),
                        self.value_of(child),
                    )])),
                    None => StateValue::default(),
                }
            }
            StateKind::Parallel => StateValue::Branch(
                graph
                    .regions(id)
                    .filter(|region| self.nodes.contains(region))
                    .map(|region| (graph.node(region).key.clone(), self.value_of(region)))
                    .collect(),
            ),
            _ => StateValue::default(),
        }
    }

    /// Whether `pattern` describes part of the active configuration.
    ///
    /// ```rust
    /// use harel::machine::Machine;
    /// use serde_json::json;
    ///
    /// let machine = Machine::from_json(json!({
    ///     "initial": "a",
    ///     "states": {"a": {"initial": "b", "states": {"b": {}}}}
    /// })).unwrap();
    /// let (snapshot, _) = machine.initial_transition(None).unwrap();
    ///
    /// assert!(snapshot.matches("a"));
    /// assert!(snapshot.matches("a.b"));
    /// assert!(!snapshot.matches("b"));
    /// ```
    pub fn matches(&self, pattern: impl Into<StateValue>) -> bool {
        matches_state(&pattern.into(), &self.value())
    }

    /// Union of the tags of all active nodes.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .flat_map(|id| self.graph.node(*id).tags.iter().map(String::as_str))
            .collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.nodes
            .iter()
            .any(|id| self.graph.node(*id).tags.iter().any(|t| t == tag))
    }

    /// Whether `event` would do anything in this snapshot, evaluated with
    /// `machine`'s implementations.
    pub fn can(
        &self,
        machine: &crate::machine::Machine,
        event: impl Into<crate::core::Event>,
    ) -> Result<bool, crate::engine::TransitionError> {
        machine.can(self, event)
    }

    /// Plain-data form suitable for storage and [`crate::machine::Machine::resolve_state`].
    pub fn persisted(&self) -> PersistedSnapshot {
        let history_value = self
            .history
            .iter()
            .map(|(history, nodes)| {
                (
                    self.graph.node(history).id.clone(),
                    nodes
                        .iter()
                        .map(|node| self.graph.node(*node).id.clone())
                        .collect(),
                )
            })
            .collect();

        PersistedSnapshot {
            value: self.value(),
            context: self.context.clone(),
            status: self.status,
            output: self.output.clone(),
            error: self.error.clone(),
            children: self.children.clone(),
            history_value,
        }
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.context == other.context
            && self.status == other.status
            && self.output == other.output
            && self.error == other.error
            && self.children == other.children
            && self.history == other.history
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("machine", &self.graph.machine_id())
            .field("value", &self.value())
            .field("context", &self.context)
            .field("status", &self.status)
            .field("output", &self.output)
            .field("error", &self.error)
            .field("children", &self.children)
            .finish()
    }
}

impl Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.persisted().serialize(serializer)
    }
}
