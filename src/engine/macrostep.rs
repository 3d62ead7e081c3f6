//! Driving an event to a stable snapshot.

use super::{Engine, TransitionError};
use crate::core::action::STOP_CHILD;
use crate::core::event::{init_event, STOP_EVENT};
use crate::core::{ActionDescriptor, Event};
use crate::graph::{StateGraph, TransitionId};
use crate::snapshot::{Snapshot, SnapshotStatus};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// One recorded microstep of a macrostep.
#[derive(Clone, Debug, PartialEq)]
pub struct Microstep {
    /// The event that selected the transitions (the last processed event
    /// for eventless microsteps).
    pub event: Event,
    pub snapshot: Snapshot,
    pub actions: Vec<ActionDescriptor>,
    pub transitions: Vec<TransitionId>,
}

/// Result of processing one event.
#[derive(Clone, Debug, PartialEq)]
pub struct MacrostepResult {
    pub snapshot: Snapshot,
    /// Every action of every microstep, in execution order.
    pub actions: Vec<ActionDescriptor>,
    pub microsteps: Vec<Microstep>,
}

impl Engine<'_> {
    /// Enter the initial configuration and settle.
    pub(crate) fn initial_macrostep(
        &self,
        graph: Arc<StateGraph>,
        input: Option<Value>,
    ) -> Result<MacrostepResult, TransitionError> {
        let event = init_event(input);
        let pre_initial = Snapshot::pre_initial(graph, self.graph.context().clone());
        let mut queue = VecDeque::new();
        let (snapshot, actions) = self.initial_microstep(&pre_initial, &event, &mut queue)?;
        let steps = vec![Microstep {
            event: event.clone(),
            snapshot: snapshot.clone(),
            actions,
            transitions: Vec::new(),
        }];
        self.settle(snapshot, event, queue, steps)
    }

    pub(crate) fn macrostep(
        &self,
        snapshot: &Snapshot,
        event: &Event,
    ) -> Result<MacrostepResult, TransitionError> {
        self.ensure_own(snapshot)?;
        if !snapshot.is_active() {
            tracing::debug!(status = %snapshot.status(), event = %event.event_type, "ignoring event for inactive machine");
            return Ok(MacrostepResult {
                snapshot: snapshot.clone(),
                actions: Vec::new(),
                microsteps: Vec::new(),
            });
        }

        if event.event_type == STOP_EVENT {
            let mut stopped = snapshot.clone();
            stopped.status = SnapshotStatus::Stopped;
            return Ok(self.finish(stopped.clone(), vec![record(event, stopped, Vec::new(), Vec::new())]));
        }

        let transitions = self.select_transitions(snapshot, event)?;
        if event.is_error_actor_event() && transitions.is_empty() {
            let mut failed = snapshot.clone();
            failed.status = SnapshotStatus::Error;
            failed.error = Some(event.get("error").cloned().unwrap_or(Value::Null));
            tracing::debug!(event = %event.event_type, "unhandled child error");
            return Ok(self.finish(failed.clone(), vec![record(event, failed, Vec::new(), Vec::new())]));
        }

        let mut queue = VecDeque::new();
        let (next, actions) = self.microstep(&transitions, snapshot, event, &mut queue)?;
        let steps = vec![record(event, next.clone(), actions, transitions)];
        self.settle(next, event.clone(), queue, steps)
    }

    /// Run eventless transitions and internally raised events until neither
    /// changes anything.
    fn settle(
        &self,
        mut snapshot: Snapshot,
        mut event: Event,
        mut queue: VecDeque<Event>,
        mut steps: Vec<Microstep>,
    ) -> Result<MacrostepResult, TransitionError> {
        let mut select_eventless = true;

        while snapshot.is_active() {
            let mut enabled = if select_eventless {
                self.select_eventless(&snapshot, &event)?
            } else {
                Vec::new()
            };
            let eventless = !enabled.is_empty();
            if !eventless {
                let Some(next_event) = queue.pop_front() else {
                    break;
                };
                event = next_event;
                enabled = self.select_transitions(&snapshot, &event)?;
            }

            if steps.len() >= self.config.max_microsteps {
                tracing::warn!(
                    machine = %self.graph.machine_id(),
                    limit = self.config.max_microsteps,
                    "macrostep did not settle"
                );
                return Err(TransitionError::NonterminatingEventlessCycle {
                    limit: self.config.max_microsteps,
                });
            }

            let (next, actions) = self.microstep(&enabled, &snapshot, &event, &mut queue)?;
            // an eventless step that changes nothing would be selected forever
            select_eventless = !(eventless && next == snapshot);
            steps.push(record(&event, next.clone(), actions, enabled));
            snapshot = next;
        }

        tracing::debug!(
            machine = %self.graph.machine_id(),
            event = %event.event_type,
            microsteps = steps.len(),
            status = %snapshot.status(),
            "macrostep settled"
        );
        Ok(self.finish(snapshot, steps))
    }

    /// Collect actions; a machine that stopped running stops its children.
    fn finish(&self, mut snapshot: Snapshot, steps: Vec<Microstep>) -> MacrostepResult {
        let mut actions: Vec<ActionDescriptor> = steps
            .iter()
            .flat_map(|step| step.actions.iter().cloned())
            .collect();

        if !snapshot.is_active() {
            for id in std::mem::take(&mut snapshot.children).into_keys() {
                actions.push(ActionDescriptor::new(STOP_CHILD, json!({ "id": id })));
            }
        }

        MacrostepResult {
            snapshot,
            actions,
            microsteps: steps,
        }
    }
}

fn record(
    event: &Event,
    snapshot: Snapshot,
    actions: Vec<ActionDescriptor>,
    transitions: Vec<TransitionId>,
) -> Microstep {
    Microstep {
        event: event.clone(),
        snapshot,
        actions,
        transitions,
    }
}
