//! Recorded configurations of history pseudo-states.
//!
//! When a state with history children is exited, each history child
//! remembers part of the configuration being left: a shallow history the
//! active direct children of its parent, a deep history the active atomic
//! descendants. Targeting the history node later restores that record.

use crate::definition::HistoryType;
use crate::graph::{StateGraph, StateNodeId};
use std::collections::{BTreeMap, BTreeSet};

/// History node → nodes recorded when its parent was last exited.
///
/// Values are immutable: [`HistoryValue::record`] returns a new value and
/// leaves the original untouched, so snapshots can share it safely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryValue {
    entries: BTreeMap<StateNodeId, Vec<StateNodeId>>,
}

impl HistoryValue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `nodes` for `history`, returning a new value.
    pub fn record(&self, history: StateNodeId, nodes: Vec<StateNodeId>) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(history, nodes);
        Self { entries }
    }

    pub fn get(&self, history: StateNodeId) -> Option<&[StateNodeId]> {
        self.entries.get(&history).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StateNodeId, &[StateNodeId])> {
        self.entries
            .iter()
            .map(|(history, nodes)| (*history, nodes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(StateNodeId, Vec<StateNodeId>)> for HistoryValue {
    fn from_iter<I: IntoIterator<Item = (StateNodeId, Vec<StateNodeId>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Nodes a history child of `exiting` should remember, given the active
/// configuration just before the exit.
pub fn recorded_nodes(
    graph: &StateGraph,
    history: StateNodeId,
    exiting: StateNodeId,
    active: &BTreeSet<StateNodeId>,
) -> Vec<StateNodeId> {
    let deep = graph.node(history).history == Some(HistoryType::Deep);
    active
        .iter()
        .copied()
        .filter(|node| {
            if deep {
                graph.is_atomic(*node) && graph.is_descendant(*node, exiting)
            } else {
                graph.parent(*node) == Some(exiting)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::MachineConfig;
    use serde_json::json;

    fn graph() -> StateGraph {
        StateGraph::build(
            &MachineConfig::from_json(json!({
                "id": "m",
                "initial": "a",
                "states": {
                    "a": {
                        "initial": "x",
                        "states": {
                            "shallow": {"type": "history"},
                            "deep": {"type": "history", "history": "deep"},
                            "x": {"initial": "x1", "states": {"x1": {}, "x2": {}}},
                            "y": {}
                        }
                    }
                }
            }))
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn record_returns_new_value() {
        let empty = HistoryValue::new();
        let recorded = empty.record(StateNodeId(2), vec![StateNodeId(4)]);
        assert!(empty.is_empty());
        assert_eq!(recorded.get(StateNodeId(2)), Some(&[StateNodeId(4)][..]));
    }

    #[test]
    fn shallow_and_deep_record_different_levels() {
        let graph = graph();
        let id = |name: &str| graph.node_by_id(name).unwrap();
        let active: BTreeSet<StateNodeId> =
            [id("m"), id("m.a"), id("m.a.x"), id("m.a.x.x2")].into_iter().collect();

        assert_eq!(
            recorded_nodes(&graph, id("m.a.shallow"), id("m.a"), &active),
            vec![id("m.a.x")]
        );
        assert_eq!(
            recorded_nodes(&graph, id("m.a.deep"), id("m.a"), &active),
            vec![id("m.a.x.x2")]
        );
    }
}
