//! Compiles a [`MachineConfig`] into a [`StateGraph`].
//!
//! Construction runs in two passes: the first allocates every node in
//! document order, the second resolves references (targets, initial states,
//! history defaults, `stateIn` guards) now that every id is known. Problems
//! are accumulated so a broken definition reports all of them at once.

use super::{
    DefinitionError, InvokeDefinition, StateGraph, StateKind, StateNode, StateNodeId,
    TransitionDefinition, TransitionId,
};
use crate::core::action::{EventExpr, RaiseParams};
use crate::core::event::{
    after_event_type, done_actor_event_type, done_state_event_type, error_actor_event_type,
};
use crate::core::{Action, Delay, Guard};
use crate::definition::{GuardConfig, HistoryType, MachineConfig, StateConfig, StateType, TransitionConfig};
use std::collections::HashMap;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Check = Validation<(), NonEmptyVec<DefinitionError>>;

impl StateGraph {
    /// Build and validate the graph for a machine definition.
    pub fn build(config: &MachineConfig) -> Result<StateGraph, DefinitionError> {
        let mut builder = GraphBuilder {
            graph: StateGraph {
                machine_id: config.id.clone(),
                nodes: Vec::new(),
                transitions: Vec::new(),
                ids: HashMap::new(),
                context: config.context.clone(),
            },
            configs: Vec::new(),
            checks: Vec::new(),
        };

        builder.allocate(&config.root, None, config.id.clone(), Vec::new());
        for index in 0..builder.configs.len() {
            builder.resolve(StateNodeId(index));
        }
        builder.finish()
    }
}

struct GraphBuilder<'a> {
    graph: StateGraph,
    configs: Vec<&'a StateConfig>,
    checks: Vec<Check>,
}

impl<'a> GraphBuilder<'a> {
    fn record<T>(&mut self, result: Result<T, DefinitionError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.checks.push(Validation::fail(error));
                None
            }
        }
    }

    fn reject(&mut self, error: DefinitionError) {
        self.checks.push(Validation::fail(error));
    }

    fn finish(self) -> Result<StateGraph, DefinitionError> {
        match Validation::all_vec(self.checks) {
            Validation::Success(_) => Ok(self.graph),
            Validation::Failure(errors) => {
                let mut errors: Vec<DefinitionError> = errors.iter().cloned().collect();
                if errors.len() == 1 {
                    Err(errors.remove(0))
                } else {
                    Err(DefinitionError::Invalid(errors))
                }
            }
        }
    }

    /// First pass: allocate `config` and its descendants in pre-order.
    fn allocate(
        &mut self,
        config: &'a StateConfig,
        parent: Option<StateNodeId>,
        key: String,
        path: Vec<String>,
    ) -> StateNodeId {
        let index = StateNodeId(self.graph.nodes.len());
        let id = match (&config.id, parent) {
            (Some(explicit), _) => explicit.clone(),
            (None, None) => self.graph.machine_id.clone(),
            (None, Some(_)) => format!("{}.{}", self.graph.machine_id, path.join(".")),
        };

        let kind = match config.kind {
            Some(StateType::Atomic) => StateKind::Atomic,
            Some(StateType::Compound) => StateKind::Compound,
            Some(StateType::Parallel) => StateKind::Parallel,
            Some(StateType::Final) => StateKind::Final,
            Some(StateType::History) => StateKind::History,
            None if config.states.is_empty() => StateKind::Atomic,
            None => StateKind::Compound,
        };

        if self.graph.ids.insert(id.clone(), index).is_some() {
            self.reject(DefinitionError::DuplicateStateId { id: id.clone() });
        }

        let invoke = config
            .invoke
            .iter()
            .enumerate()
            .map(|(position, invoke)| InvokeDefinition {
                id: invoke
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("{id}:invocation[{position}]")),
                src: invoke.src.clone(),
                input: invoke.input.clone(),
            })
            .collect();

        self.graph.nodes.push(StateNode {
            id,
            key,
            path: path.clone(),
            kind,
            parent,
            children: Vec::new(),
            initial: None,
            on: Vec::new(),
            always: Vec::new(),
            entry: config.entry.0.clone(),
            exit: config.exit.0.clone(),
            invoke,
            history: match kind {
                StateKind::History => Some(config.history.unwrap_or(HistoryType::Shallow)),
                _ => None,
            },
            history_target: Vec::new(),
            output: config.output.clone(),
            tags: config.tags.0.clone(),
            description: config.description.clone(),
            meta: config.meta.clone(),
        });
        self.configs.push(config);

        for (child_key, child_config) in config.states.iter() {
            let mut child_path = path.clone();
            child_path.push(child_key.to_string());
            let child = self.allocate(child_config, Some(index), child_key.to_string(), child_path);
            self.graph.nodes[index.0].children.push(child);
        }
        index
    }

    /// Second pass: resolve every reference held by one node.
    fn resolve(&mut self, id: StateNodeId) {
        let config = self.configs[id.0];
        let node_id = self.graph.node(id).id.clone();
        let kind = self.graph.node(id).kind;

        self.resolve_structure(id, kind, config, &node_id);

        for (descriptor, transitions) in config.on.iter() {
            self.add_transitions(id, Some(descriptor.to_string()), transitions.iter());
        }

        for transition in config.always.iter() {
            if let Some(resolved) = self.transition(id, None, transition) {
                let transition_id = self.push_transition(resolved);
                self.graph.nodes[id.0].always.push(transition_id);
            }
        }

        for (delay_key, transitions) in config.after.iter() {
            let event_type = after_event_type(delay_key, &node_id);
            let node = &mut self.graph.nodes[id.0];
            node.entry.push(Action::Raise(RaiseParams {
                event: EventExpr::Type(event_type.clone()),
                delay: Some(Delay::from_key(delay_key)),
                id: Some(event_type.clone()),
            }));
            node.exit.push(Action::cancel(event_type.clone()));
            self.add_transitions(id, Some(event_type), transitions.iter());
        }

        if !config.on_done.is_empty() {
            if matches!(kind, StateKind::Compound | StateKind::Parallel) {
                self.add_transitions(id, Some(done_state_event_type(&node_id)), config.on_done.iter());
            } else {
                self.reject(DefinitionError::InvalidState {
                    state_id: node_id.clone(),
                    reason: format!("onDone is not allowed on {kind} states"),
                });
            }
        }

        let invocations = self.graph.node(id).invoke.clone();
        for (invoke, invoke_config) in invocations.iter().zip(config.invoke.iter()) {
            if !invoke_config.on_done.is_empty() {
                self.add_transitions(
                    id,
                    Some(done_actor_event_type(&invoke.id)),
                    invoke_config.on_done.iter(),
                );
            }
            if !invoke_config.on_error.is_empty() {
                self.add_transitions(
                    id,
                    Some(error_actor_event_type(&invoke.id)),
                    invoke_config.on_error.iter(),
                );
            }
        }
    }

    fn resolve_structure(&mut self, id: StateNodeId, kind: StateKind, config: &StateConfig, node_id: &str) {
        let has_children = !self.graph.node(id).children.is_empty();
        let invalid = |reason: &str| DefinitionError::InvalidState {
            state_id: node_id.to_string(),
            reason: reason.to_string(),
        };

        match kind {
            StateKind::Compound => {
                let initial = match &config.initial {
                    Some(key) => self.graph.child_by_key(id, key).ok_or_else(|| {
                        DefinitionError::InvalidInitial {
                            state_id: node_id.to_string(),
                            initial: key.clone(),
                        }
                    }),
                    None => self.graph.regions(id).next().ok_or_else(|| {
                        DefinitionError::MissingInitial {
                            state_id: node_id.to_string(),
                        }
                    }),
                };
                if let Some(initial) = self.record(initial) {
                    if self.graph.node(initial).is_history() {
                        self.reject(invalid("initial state cannot be a history state"));
                    }
                    self.graph.nodes[id.0].initial = Some(initial);
                }
            }
            StateKind::Parallel => {
                if config.initial.is_some() {
                    self.reject(invalid("parallel states cannot declare an initial state"));
                }
                if self.graph.regions(id).next().is_none() {
                    self.reject(invalid("parallel states need at least one region"));
                }
            }
            StateKind::Atomic | StateKind::Final => {
                if has_children {
                    self.reject(invalid(&format!("{kind} states cannot have child states")));
                }
            }
            StateKind::History => {
                if has_children {
                    self.reject(invalid("history states cannot have child states"));
                }
                self.resolve_history(id, config, node_id);
            }
        }
    }

    fn resolve_history(&mut self, id: StateNodeId, config: &StateConfig, node_id: &str) {
        if config.target.is_empty() {
            let parent_has_initial = self
                .graph
                .node(id)
                .parent
                .map(|parent| self.graph.node(parent).kind == StateKind::Compound)
                .unwrap_or(false);
            if !parent_has_initial {
                self.reject(DefinitionError::MalformedHistory {
                    id: node_id.to_string(),
                });
            }
            return;
        }

        let mut targets = Vec::new();
        for target in config.target.iter() {
            let resolved = self.graph.resolve_target(id, target);
            if let Some(resolved) = self.record(resolved) {
                targets.push(resolved);
            }
        }
        self.graph.nodes[id.0].history_target = targets;
    }

    fn add_transitions<'t>(
        &mut self,
        source: StateNodeId,
        descriptor: Option<String>,
        transitions: impl Iterator<Item = &'t TransitionConfig>,
    ) {
        let mut ids = Vec::new();
        for transition in transitions {
            if let Some(resolved) = self.transition(source, descriptor.clone(), transition) {
                ids.push(self.push_transition(resolved));
            }
        }

        let Some(descriptor) = descriptor else {
            return;
        };
        let node = &mut self.graph.nodes[source.0];
        match node.on.iter_mut().find(|(existing, _)| *existing == descriptor) {
            Some((_, existing)) => existing.extend(ids),
            None => node.on.push((descriptor, ids)),
        }
    }

    fn push_transition(&mut self, transition: TransitionDefinition) -> TransitionId {
        let id = TransitionId(self.graph.transitions.len());
        self.graph.transitions.push(transition);
        id
    }

    fn transition(
        &mut self,
        source: StateNodeId,
        event: Option<String>,
        config: &TransitionConfig,
    ) -> Option<TransitionDefinition> {
        let mut targets = Vec::new();
        let mut resolved_all = true;
        for target in config.target.iter() {
            let resolved = self.graph.resolve_target(source, target);
            match self.record(resolved) {
                Some(resolved) => targets.push(resolved),
                None => resolved_all = false,
            }
        }

        let guard = match &config.guard {
            Some(guard) => {
                let resolved = self.guard(source, guard);
                Some(self.record(resolved)?)
            }
            None => None,
        };

        if !resolved_all {
            return None;
        }

        Some(TransitionDefinition {
            source,
            event,
            guard,
            targets,
            actions: config.actions.0.clone(),
            reenter: config.reenter,
        })
    }

    fn guard(&self, source: StateNodeId, config: &GuardConfig) -> Result<Guard, DefinitionError> {
        Ok(match config {
            GuardConfig::Named(name) => Guard::named(name.clone()),
            GuardConfig::Parameterized { name, params } => Guard::Named {
                name: name.clone(),
                params: params.clone(),
            },
            GuardConfig::Not { not } => Guard::Not(Box::new(self.guard(source, not)?)),
            GuardConfig::And { and } => Guard::And(
                and.iter()
                    .map(|guard| self.guard(source, guard))
                    .collect::<Result<_, _>>()?,
            ),
            GuardConfig::Or { or } => Guard::Or(
                or.iter()
                    .map(|guard| self.guard(source, guard))
                    .collect::<Result<_, _>>()?,
            ),
            GuardConfig::StateIn { state_in } => {
                let unresolved = || DefinitionError::UnresolvedTarget {
                    source_id: self.graph.node(source).id.clone(),
                    target: state_in.clone(),
                };
                let found = if state_in.starts_with('#') {
                    self.graph.resolve_target(source, state_in).ok()
                } else {
                    let path: Vec<&str> = state_in.split('.').collect();
                    self.graph.node_by_path(&path)
                };
                Guard::StateIn(found.ok_or_else(unresolved)?)
            }
        })
    }
}
