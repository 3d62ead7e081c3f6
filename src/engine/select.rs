//! Transition selection and the optimal transition set.

use super::{Engine, TransitionError};
use crate::core::{Event, GuardScope, HistoryValue};
use crate::graph::{StateNodeId, TransitionId};
use crate::snapshot::Snapshot;
use std::collections::{BTreeMap, BTreeSet};
use std::iter;

impl Engine<'_> {
    /// Transitions enabled by `event`, conflicts removed.
    pub(crate) fn select_transitions(
        &self,
        snapshot: &Snapshot,
        event: &Event,
    ) -> Result<Vec<TransitionId>, TransitionError> {
        self.select(snapshot, event, |node| {
            self.graph.candidates(node, &event.event_type)
        })
    }

    /// Enabled eventless transitions. Guards see `event`, the last event
    /// the macrostep processed.
    pub(crate) fn select_eventless(
        &self,
        snapshot: &Snapshot,
        event: &Event,
    ) -> Result<Vec<TransitionId>, TransitionError> {
        self.select(snapshot, event, |node| self.graph.node(node).always.clone())
    }

    /// For every active leaf, walk it and its ancestors and keep the first
    /// transition whose guard passes.
    fn select(
        &self,
        snapshot: &Snapshot,
        event: &Event,
        candidates: impl Fn(StateNodeId) -> Vec<TransitionId>,
    ) -> Result<Vec<TransitionId>, TransitionError> {
        let scope = GuardScope::new(self.registry, &snapshot.context, event, &snapshot.nodes);
        // parallel leaves often fall back to the same ancestor
        let mut evaluated: BTreeMap<TransitionId, bool> = BTreeMap::new();
        let mut enabled: Vec<TransitionId> = Vec::new();

        for leaf in snapshot.configuration() {
            'walk: for node in iter::once(leaf).chain(self.graph.proper_ancestors(leaf, None)) {
                for transition in candidates(node) {
                    let passes = match evaluated.get(&transition) {
                        Some(passes) => *passes,
                        None => {
                            let passes = match &self.graph.transition(transition).guard {
                                Some(guard) => guard.evaluate(&scope)?,
                                None => true,
                            };
                            evaluated.insert(transition, passes);
                            passes
                        }
                    };
                    if passes {
                        if !enabled.contains(&transition) {
                            enabled.push(transition);
                        }
                        break 'walk;
                    }
                }
            }
        }

        tracing::trace!(
            event = %event.event_type,
            enabled = enabled.len(),
            "selected transitions"
        );
        Ok(self.remove_conflicting(enabled, &snapshot.nodes, &snapshot.history))
    }

    /// Keep a conflict-free subset. Two transitions conflict when their
    /// exit sets intersect; a transition from a descendant source beats
    /// one from an ancestor, otherwise the earlier one stays.
    pub(crate) fn remove_conflicting(
        &self,
        enabled: Vec<TransitionId>,
        active: &BTreeSet<StateNodeId>,
        history: &HistoryValue,
    ) -> Vec<TransitionId> {
        let mut filtered: Vec<(TransitionId, BTreeSet<StateNodeId>)> = Vec::new();

        for candidate in enabled {
            let definition = self.graph.transition(candidate);
            let exits = self.exit_set(&[definition], active, history);
            let mut preempted = false;
            let mut displaced = Vec::new();

            for (kept, kept_exits) in &filtered {
                if exits.is_disjoint(kept_exits) {
                    continue;
                }
                let kept_source = self.graph.transition(*kept).source;
                if self.graph.is_descendant(definition.source, kept_source) {
                    displaced.push(*kept);
                } else {
                    preempted = true;
                    break;
                }
            }

            if !preempted {
                filtered.retain(|(kept, _)| !displaced.contains(kept));
                filtered.push((candidate, exits));
            }
        }

        filtered.into_iter().map(|(id, _)| id).collect()
    }
}
