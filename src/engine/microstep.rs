//! One atomic configuration change: exits, transition actions, entries.

use super::actions::Effects;
use super::{Engine, TransitionError};
use crate::core::action::SpawnParams;
use crate::core::event::done_state_event;
use crate::core::{recorded_nodes, Action, ActionDescriptor, Event, HistoryValue};
use crate::graph::{StateKind, StateNodeId, TransitionDefinition, TransitionId};
use crate::snapshot::{Snapshot, SnapshotStatus};
use std::collections::{BTreeSet, VecDeque};

impl Engine<'_> {
    /// Apply `transitions` to `current`.
    ///
    /// Works on a copy: an error leaves `current` untouched.
    pub(crate) fn microstep(
        &self,
        transitions: &[TransitionId],
        current: &Snapshot,
        event: &Event,
        queue: &mut VecDeque<Event>,
    ) -> Result<(Snapshot, Vec<ActionDescriptor>), TransitionError> {
        let transitions: Vec<&TransitionDefinition> = transitions
            .iter()
            .map(|id| self.graph.transition(*id))
            .collect();
        let mut next = current.clone();
        let mut effects = Effects::new(queue);

        self.exit_states(&transitions, &mut next, event, &mut effects)?;
        for transition in &transitions {
            self.execute_actions(&transition.actions, &mut next, event, &mut effects)?;
        }
        let to_enter = self.entry_set(&transitions, &next.history);
        self.enter_states(to_enter, &mut next, event, &mut effects)?;

        Ok((next, effects.into_actions()))
    }

    /// Enter the root and its default descendants from an empty configuration.
    pub(crate) fn initial_microstep(
        &self,
        current: &Snapshot,
        event: &Event,
        queue: &mut VecDeque<Event>,
    ) -> Result<(Snapshot, Vec<ActionDescriptor>), TransitionError> {
        let root = self.graph.root();
        let mut to_enter = BTreeSet::from([root]);
        self.add_descendants_to_enter(root, &current.history, &mut to_enter);

        let mut next = current.clone();
        let mut effects = Effects::new(queue);
        self.enter_states(to_enter, &mut next, event, &mut effects)?;
        Ok((next, effects.into_actions()))
    }

    fn exit_states(
        &self,
        transitions: &[&TransitionDefinition],
        snapshot: &mut Snapshot,
        event: &Event,
        effects: &mut Effects<'_>,
    ) -> Result<(), TransitionError> {
        let exit_set = self.exit_set(transitions, &snapshot.nodes, &snapshot.history);

        // history is recorded against the configuration before any exit
        let mut history = snapshot.history.clone();
        for &exiting in exit_set.iter().rev() {
            for history_node in self.graph.history_children(exiting) {
                let recorded = recorded_nodes(self.graph, history_node, exiting, &snapshot.nodes);
                history = history.record(history_node, recorded);
            }
        }
        snapshot.history = history;

        for &exiting in exit_set.iter().rev() {
            let node = self.graph.node(exiting);
            let mut actions = node.exit.clone();
            actions.extend(node.invoke.iter().map(|invoke| Action::stop_child(invoke.id.clone())));
            self.execute_actions(&actions, snapshot, event, effects)?;
            snapshot.nodes.remove(&exiting);
            tracing::trace!(state = %node.id, "exited state");
        }
        Ok(())
    }

    fn enter_states(
        &self,
        to_enter: BTreeSet<StateNodeId>,
        snapshot: &mut Snapshot,
        event: &Event,
        effects: &mut Effects<'_>,
    ) -> Result<(), TransitionError> {
        let mut completed: BTreeSet<StateNodeId> = BTreeSet::new();

        for entering in to_enter {
            snapshot.nodes.insert(entering);
            let node = self.graph.node(entering);
            let mut actions = node.entry.clone();
            actions.extend(node.invoke.iter().map(|invoke| {
                Action::SpawnChild(SpawnParams {
                    src: invoke.src.clone(),
                    id: invoke.id.clone(),
                    input: invoke.input.clone(),
                })
            }));
            self.execute_actions(&actions, snapshot, event, effects)?;
            tracing::trace!(state = %node.id, "entered state");

            if !node.is_final() {
                continue;
            }

            let parent = node.parent;
            let mut marker = match parent {
                Some(parent) if self.graph.node(parent).kind == StateKind::Parallel => Some(parent),
                Some(parent) => self.graph.parent(parent),
                None => None,
            };
            let mut completion = marker.unwrap_or(entering);

            if let Some(parent) = parent.filter(|p| self.graph.node(*p).kind == StateKind::Compound) {
                effects
                    .queue
                    .push_back(done_state_event(&self.graph.node(parent).id, node.output.clone()));
            }

            while let Some(ancestor) = marker {
                if self.graph.node(ancestor).kind != StateKind::Parallel
                    || completed.contains(&ancestor)
                    || !self.in_final_state(&snapshot.nodes, ancestor)
                {
                    break;
                }
                completed.insert(ancestor);
                effects
                    .queue
                    .push_back(done_state_event(&self.graph.node(ancestor).id, None));
                completion = ancestor;
                marker = self.graph.parent(ancestor);
            }

            if marker.is_some() {
                continue;
            }

            let root = self.graph.node(self.graph.root());
            snapshot.status = SnapshotStatus::Done;
            snapshot.output = root
                .output
                .clone()
                .or_else(|| self.graph.node(completion).output.clone());
            tracing::debug!(machine = %self.graph.machine_id(), "machine reached a top-level final state");
        }

        if snapshot.status == SnapshotStatus::Done {
            let remaining: Vec<StateNodeId> = snapshot.nodes.iter().rev().copied().collect();
            for node in remaining {
                let exit = self.graph.node(node).exit.clone();
                self.execute_actions(&exit, snapshot, event, effects)?;
            }
        }
        Ok(())
    }

    fn in_final_state(&self, active: &BTreeSet<StateNodeId>, id: StateNodeId) -> bool {
        match self.graph.node(id).kind {
            StateKind::Compound => self
                .graph
                .regions(id)
                .any(|child| self.graph.node(child).is_final() && active.contains(&child)),
            StateKind::Parallel => self
                .graph
                .regions(id)
                .all(|region| self.in_final_state(active, region)),
            kind => kind == StateKind::Final,
        }
    }

    /// Nodes a transition to a history node actually lands on.
    fn effective_targets(
        &self,
        targets: &[StateNodeId],
        history: &HistoryValue,
    ) -> Vec<StateNodeId> {
        let mut effective = Vec::new();
        for &target in targets {
            let resolved = if self.graph.node(target).is_history() {
                match history.get(target) {
                    Some(recorded) => recorded.to_vec(),
                    None => self.effective_targets(&self.history_default(target), history),
                }
            } else {
                vec![target]
            };
            for node in resolved {
                if !effective.contains(&node) {
                    effective.push(node);
                }
            }
        }
        effective
    }

    /// Default target of a history node: its own, else its parent's initial.
    fn history_default(&self, history_node: StateNodeId) -> Vec<StateNodeId> {
        let node = self.graph.node(history_node);
        if !node.history_target.is_empty() {
            return node.history_target.clone();
        }
        node.parent
            .and_then(|parent| self.graph.node(parent).initial)
            .into_iter()
            .collect()
    }

    /// The node whose active descendants a transition exits. `None` only
    /// for a re-entering transition of the root.
    pub(crate) fn transition_domain(
        &self,
        transition: &TransitionDefinition,
        history: &HistoryValue,
    ) -> Option<StateNodeId> {
        let targets = self.effective_targets(&transition.targets, history);
        if targets.is_empty() {
            return None;
        }

        let source = transition.source;
        if !transition.reenter
            && targets
                .iter()
                .all(|target| *target == source || self.graph.is_descendant(*target, source))
        {
            return Some(source);
        }

        let mut nodes = targets;
        nodes.push(source);
        if let Some(lcca) = self.least_common_ancestor(&nodes) {
            return Some(lcca);
        }
        if transition.reenter {
            None
        } else {
            Some(self.graph.root())
        }
    }

    /// Innermost proper ancestor of the first node containing all others.
    fn least_common_ancestor(&self, nodes: &[StateNodeId]) -> Option<StateNodeId> {
        let (head, tail) = nodes.split_first()?;
        self.graph
            .proper_ancestors(*head, None)
            .into_iter()
            .find(|ancestor| tail.iter().all(|node| self.graph.is_descendant(*node, *ancestor)))
    }

    pub(crate) fn exit_set(
        &self,
        transitions: &[&TransitionDefinition],
        active: &BTreeSet<StateNodeId>,
        history: &HistoryValue,
    ) -> BTreeSet<StateNodeId> {
        let mut exits = BTreeSet::new();
        for transition in transitions {
            if transition.is_targetless() {
                continue;
            }
            let domain = self.transition_domain(transition, history);
            if transition.reenter && domain == Some(transition.source) {
                exits.insert(transition.source);
            }
            let domain = domain.unwrap_or_else(|| self.graph.root());
            exits.extend(
                active
                    .iter()
                    .copied()
                    .filter(|node| self.graph.is_descendant(*node, domain)),
            );
        }
        exits
    }

    fn entry_set(
        &self,
        transitions: &[&TransitionDefinition],
        history: &HistoryValue,
    ) -> BTreeSet<StateNodeId> {
        let mut to_enter = BTreeSet::new();
        for transition in transitions {
            let domain = self.transition_domain(transition, history);
            let source = transition.source;

            for &target in &transition.targets {
                if !self.graph.node(target).is_history()
                    && (source != target || domain != Some(source) || transition.reenter)
                {
                    to_enter.insert(target);
                }
                self.add_descendants_to_enter(target, history, &mut to_enter);
            }

            let reentrancy_domain = if self.graph.parent(source).is_none() && transition.reenter {
                None
            } else {
                domain
            };
            for target in self.effective_targets(&transition.targets, history) {
                let mut ancestors = self.graph.proper_ancestors(target, domain);
                if let Some(domain) = domain.filter(|d| self.graph.node(*d).kind == StateKind::Parallel) {
                    ancestors.push(domain);
                }
                self.add_ancestors_to_enter(&ancestors, reentrancy_domain, history, &mut to_enter);
            }
        }
        to_enter
    }

    fn add_descendants_to_enter(
        &self,
        id: StateNodeId,
        history: &HistoryValue,
        to_enter: &mut BTreeSet<StateNodeId>,
    ) {
        let node = self.graph.node(id);
        match node.kind {
            StateKind::History => {
                let restored = match history.get(id) {
                    Some(recorded) => recorded.to_vec(),
                    None => self.history_default(id),
                };
                for &state in &restored {
                    to_enter.insert(state);
                    self.add_descendants_to_enter(state, history, to_enter);
                }
                for &state in &restored {
                    self.add_proper_ancestors_to_enter(state, node.parent, history, to_enter);
                }
            }
            StateKind::Compound => {
                if let Some(initial) = node.initial {
                    if !self.graph.node(initial).is_history() {
                        to_enter.insert(initial);
                    }
                    self.add_descendants_to_enter(initial, history, to_enter);
                    self.add_proper_ancestors_to_enter(initial, Some(id), history, to_enter);
                }
            }
            StateKind::Parallel => self.enter_missing_regions(id, history, to_enter),
            StateKind::Atomic | StateKind::Final => {}
        }
    }

    fn add_ancestors_to_enter(
        &self,
        ancestors: &[StateNodeId],
        reentrancy_domain: Option<StateNodeId>,
        history: &HistoryValue,
        to_enter: &mut BTreeSet<StateNodeId>,
    ) {
        for &ancestor in ancestors {
            let within = reentrancy_domain
                .map(|domain| self.graph.is_descendant(ancestor, domain))
                .unwrap_or(true);
            if within {
                to_enter.insert(ancestor);
            }
            if self.graph.node(ancestor).kind == StateKind::Parallel {
                self.enter_missing_regions(ancestor, history, to_enter);
            }
        }
    }

    fn add_proper_ancestors_to_enter(
        &self,
        id: StateNodeId,
        stop_at: Option<StateNodeId>,
        history: &HistoryValue,
        to_enter: &mut BTreeSet<StateNodeId>,
    ) {
        let ancestors = self.graph.proper_ancestors(id, stop_at);
        self.add_ancestors_to_enter(&ancestors, None, history, to_enter);
    }

    /// Default-enter every region of a parallel node nothing is entering yet.
    fn enter_missing_regions(
        &self,
        parallel: StateNodeId,
        history: &HistoryValue,
        to_enter: &mut BTreeSet<StateNodeId>,
    ) {
        let regions: Vec<StateNodeId> = self.graph.regions(parallel).collect();
        for region in regions {
            if to_enter.iter().any(|node| self.graph.is_descendant(*node, region)) {
                continue;
            }
            to_enter.insert(region);
            self.add_descendants_to_enter(region, history, to_enter);
        }
    }
}
