//! Rebuilding a [`Snapshot`] from its persisted form.

use super::{PersistedSnapshot, Snapshot, SnapshotError};
use crate::core::HistoryValue;
use crate::graph::{StateGraph, StateKind, StateNodeId};
use std::collections::BTreeSet;
use std::sync::Arc;

pub(super) fn resolve(
    graph: Arc<StateGraph>,
    persisted: &PersistedSnapshot,
) -> Result<Snapshot, SnapshotError> {
    let unresolvable = |reason: String| SnapshotError::UnresolvableSnapshot {
        machine_id: graph.machine_id().to_string(),
        reason,
    };

    let mut nodes = BTreeSet::from([graph.root()]);
    for path in persisted.value.paths() {
        let mut current = graph.root();
        for key in &path {
            current = graph.child_by_key(current, key).ok_or_else(|| {
                unresolvable(format!(
                    "'{}' has no child state '{key}'",
                    graph.node(current).id
                ))
            })?;
            nodes.insert(current);
        }
    }
    complete_default_entry(&graph, &mut nodes);
    validate(&graph, &nodes).map_err(unresolvable)?;

    let mut history = HistoryValue::new();
    for (history_id, recorded) in &persisted.history_value {
        let history_node = graph
            .node_by_id(history_id)
            .filter(|id| graph.node(*id).is_history())
            .ok_or_else(|| unresolvable(format!("'{history_id}' is not a history state")))?;
        let recorded = recorded
            .iter()
            .map(|id| {
                graph
                    .node_by_id(id)
                    .ok_or_else(|| unresolvable(format!("history refers to unknown state '{id}'")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        history = history.record(history_node, recorded);
    }

    Ok(Snapshot {
        graph,
        nodes,
        context: persisted.context.clone(),
        status: persisted.status,
        output: persisted.output.clone(),
        error: persisted.error.clone(),
        children: persisted.children.clone(),
        history,
    })
}

/// Add default descendants of every active node that has none active.
///
/// Ids are assigned in pre-order, so a single ascending pass also visits
/// the nodes it adds.
fn complete_default_entry(graph: &StateGraph, nodes: &mut BTreeSet<StateNodeId>) {
    for (id, node) in graph.nodes() {
        if !nodes.contains(&id) {
            continue;
        }
        match node.kind {
            StateKind::Compound => {
                let has_active_child = graph.regions(id).any(|child| nodes.contains(&child));
                if let (false, Some(initial)) = (has_active_child, node.initial) {
                    nodes.insert(initial);
                }
            }
            StateKind::Parallel => nodes.extend(graph.regions(id)),
            _ => {}
        }
    }
}

fn validate(graph: &StateGraph, nodes: &BTreeSet<StateNodeId>) -> Result<(), String> {
    for &id in nodes {
        let node = graph.node(id);
        if node.is_history() {
            return Err(format!("history state '{}' cannot be active", node.id));
        }
        if let Some(parent) = node.parent {
            if !nodes.contains(&parent) {
                return Err(format!("'{}' is active but its parent is not", node.id));
            }
        }
        let active_children = graph.regions(id).filter(|child| nodes.contains(child)).count();
        match node.kind {
            StateKind::Compound if active_children != 1 => {
                return Err(format!(
                    "compound state '{}' has {active_children} active children",
                    node.id
                ));
            }
            StateKind::Parallel if active_children != graph.regions(id).count() => {
                return Err(format!("parallel state '{}' has inactive regions", node.id));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::MachineConfig;
    use serde_json::json;

    fn graph() -> Arc<StateGraph> {
        Arc::new(
            StateGraph::build(
                &MachineConfig::from_json(json!({
                    "id": "m",
                    "initial": "a",
                    "states": {
                        "a": {
                            "initial": "x",
                            "states": {"hist": {"type": "history"}, "x": {}, "y": {}}
                        },
                        "p": {
                            "type": "parallel",
                            "states": {
                                "left": {"initial": "l1", "states": {"l1": {}, "l2": {}}},
                                "right": {}
                            }
                        }
                    }
                }))
                .unwrap(),
            )
            .unwrap(),
        )
    }

    fn persisted(value: serde_json::Value) -> PersistedSnapshot {
        PersistedSnapshot::from_json(json!({"value": value})).unwrap()
    }

    #[test]
    fn dotted_value_resolves_to_full_configuration() {
        let snapshot = resolve(graph(), &persisted(json!("a.y"))).unwrap();
        assert_eq!(snapshot.configuration_ids(), vec!["m.a.y"]);
        assert_eq!(snapshot.nodes().count(), 3);
    }

    #[test]
    fn partial_value_completes_defaults() {
        let snapshot = resolve(graph(), &persisted(json!("p"))).unwrap();
        assert_eq!(snapshot.configuration_ids(), vec!["m.p.left.l1", "m.p.right"]);

        let snapshot = resolve(graph(), &persisted(json!({"p": {"left": "l2"}}))).unwrap();
        assert_eq!(snapshot.configuration_ids(), vec!["m.p.left.l2", "m.p.right"]);
    }

    #[test]
    fn unknown_states_are_unresolvable() {
        let result = resolve(graph(), &persisted(json!("a.nope")));
        assert!(matches!(result, Err(SnapshotError::UnresolvableSnapshot { .. })));
    }

    #[test]
    fn two_children_of_a_compound_are_rejected() {
        let result = resolve(graph(), &persisted(json!({"a": "x", "p": {}})));
        assert!(matches!(result, Err(SnapshotError::UnresolvableSnapshot { .. })));
    }

    #[test]
    fn history_states_cannot_be_active() {
        let result = resolve(graph(), &persisted(json!("a.hist")));
        assert!(matches!(result, Err(SnapshotError::UnresolvableSnapshot { .. })));
    }

    #[test]
    fn history_value_is_restored() {
        let mut data = persisted(json!("p"));
        data.history_value
            .insert("m.a.hist".to_string(), vec!["m.a.y".to_string()]);
        let graph = graph();
        let snapshot = resolve(Arc::clone(&graph), &data).unwrap();
        let hist = graph.node_by_id("m.a.hist").unwrap();
        assert_eq!(
            snapshot.history_value().get(hist),
            Some(&[graph.node_by_id("m.a.y").unwrap()][..])
        );

        data.history_value
            .insert("m.a.x".to_string(), vec!["m.a.y".to_string()]);
        assert!(resolve(graph, &data).is_err());
    }
}
