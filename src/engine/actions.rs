//! Resolving declared actions into executable descriptors.
//!
//! Actions run strictly in order. `assign` updates the working context at
//! once, so later actions in the same microstep observe it. Undelayed
//! `raise` events go to the macrostep's internal queue; every other action
//! leaves an [`ActionDescriptor`] for the executor.

use super::{Engine, TransitionError};
use crate::core::action::{
    Assignment, EventExpr, LogParams, RaiseParams, SendToParams, SpawnParams, ASSIGN, CANCEL,
    EMIT, LOG, RAISE, SEND_TO, SPAWN_CHILD, STOP_CHILD,
};
use crate::core::{Action, ActionDescriptor, Delay, Event};
use crate::registry::EvalArgs;
use crate::snapshot::{ChildRef, Snapshot};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;

/// Output collected while a microstep runs.
pub(crate) struct Effects<'q> {
    actions: Vec<ActionDescriptor>,
    pub(crate) queue: &'q mut VecDeque<Event>,
}

impl<'q> Effects<'q> {
    pub(crate) fn new(queue: &'q mut VecDeque<Event>) -> Self {
        Self {
            actions: Vec::new(),
            queue,
        }
    }

    fn push(&mut self, action_type: &str, params: Value) {
        tracing::trace!(action = action_type, "resolved action");
        self.actions.push(ActionDescriptor::new(action_type, params));
    }

    pub(crate) fn into_actions(self) -> Vec<ActionDescriptor> {
        self.actions
    }
}

impl Engine<'_> {
    pub(crate) fn execute_actions(
        &self,
        actions: &[Action],
        snapshot: &mut Snapshot,
        event: &Event,
        effects: &mut Effects<'_>,
    ) -> Result<(), TransitionError> {
        for action in actions {
            self.execute_action(action, snapshot, event, effects)?;
        }
        Ok(())
    }

    fn execute_action(
        &self,
        action: &Action,
        snapshot: &mut Snapshot,
        event: &Event,
        effects: &mut Effects<'_>,
    ) -> Result<(), TransitionError> {
        match action {
            Action::Assign(assignment) => {
                let patch = self.assignment_patch(assignment, &snapshot.context, event)?;
                snapshot.context = merge_context(&snapshot.context, patch);
                effects.push(ASSIGN, serde_json::to_value(assignment).unwrap_or_default());
            }
            Action::Raise(RaiseParams { event: expr, delay, id }) => {
                let raised = self.resolve_event(expr, RAISE, &snapshot.context, event)?;
                match delay {
                    None => effects.queue.push_back(raised),
                    Some(delay) => {
                        let delay = self.resolve_delay(delay, &snapshot.context, event)?;
                        effects.push(RAISE, delivery_params(None, &raised, Some(delay), id));
                    }
                }
            }
            Action::SendTo(SendToParams {
                to,
                event: expr,
                delay,
                id,
            }) => {
                let sent = self.resolve_event(expr, SEND_TO, &snapshot.context, event)?;
                let delay = match delay {
                    Some(delay) => Some(self.resolve_delay(delay, &snapshot.context, event)?),
                    None => None,
                };
                effects.push(SEND_TO, delivery_params(Some(to), &sent, delay, id));
            }
            Action::Cancel { id } => effects.push(CANCEL, json!({ "id": id })),
            Action::Log(LogParams { label, message }) => {
                let value = match message {
                    Some(message) => Value::String(message.clone()),
                    None => json!({"context": snapshot.context, "event": event.to_value()}),
                };
                let mut params = Map::new();
                if let Some(label) = label {
                    params.insert("label".to_string(), Value::String(label.clone()));
                }
                params.insert("value".to_string(), value);
                effects.push(LOG, Value::Object(params));
            }
            Action::Emit { event: expr } => {
                let emitted = self.resolve_event(expr, EMIT, &snapshot.context, event)?;
                effects.push(EMIT, json!({ "event": emitted.to_value() }));
            }
            Action::SpawnChild(SpawnParams { src, id, input }) => {
                snapshot.children.insert(
                    id.clone(),
                    ChildRef {
                        id: id.clone(),
                        src: src.clone(),
                    },
                );
                let mut params = json!({"src": src, "id": id});
                if let Some(input) = input {
                    params["input"] = input.clone();
                }
                effects.push(SPAWN_CHILD, params);
            }
            Action::StopChild { id } => {
                snapshot.children.remove(id);
                effects.push(STOP_CHILD, json!({ "id": id }));
            }
            Action::Custom {
                action_type,
                params,
            } => {
                let params = match self.registry.get_action_params(action_type) {
                    Some(resolve) => resolve(EvalArgs {
                        context: &snapshot.context,
                        event,
                        params,
                    })
                    .map_err(|e| TransitionError::Action {
                        action_type: action_type.clone(),
                        message: e.message,
                    })?,
                    None => params.clone(),
                };
                effects.push(action_type, params);
            }
        }
        Ok(())
    }

    fn assignment_patch(
        &self,
        assignment: &Assignment,
        context: &Value,
        event: &Event,
    ) -> Result<Value, TransitionError> {
        match assignment {
            Assignment::Patch { patch } => Ok(Value::Object(patch.clone())),
            Assignment::Named { assign, params } => {
                let assigner = self.registry.get_assigner(assign).ok_or_else(|| {
                    TransitionError::MissingImplementation {
                        kind: "assigner",
                        name: assign.clone(),
                    }
                })?;
                assigner(EvalArgs {
                    context,
                    event,
                    params,
                })
                .map_err(|e| TransitionError::Action {
                    action_type: format!("{ASSIGN}({assign})"),
                    message: e.message,
                })
            }
        }
    }

    fn resolve_event(
        &self,
        expr: &EventExpr,
        action_type: &str,
        context: &Value,
        event: &Event,
    ) -> Result<Event, TransitionError> {
        match expr {
            EventExpr::Type(event_type) => Ok(Event::new(event_type.clone())),
            EventExpr::Literal(literal) => Ok(literal.clone()),
            EventExpr::Computed { expr } => {
                let builder = self.registry.get_event(expr).ok_or_else(|| {
                    TransitionError::MissingImplementation {
                        kind: "event",
                        name: expr.clone(),
                    }
                })?;
                builder(EvalArgs {
                    context,
                    event,
                    params: &Value::Null,
                })
                .map_err(|e| TransitionError::Action {
                    action_type: action_type.to_string(),
                    message: e.message,
                })
            }
        }
    }

    fn resolve_delay(
        &self,
        delay: &Delay,
        context: &Value,
        event: &Event,
    ) -> Result<u64, TransitionError> {
        match delay {
            Delay::Millis(ms) => Ok(*ms),
            Delay::Named(name) => {
                let resolve = self.registry.get_delay(name).ok_or_else(|| {
                    TransitionError::MissingImplementation {
                        kind: "delay",
                        name: name.clone(),
                    }
                })?;
                resolve(EvalArgs {
                    context,
                    event,
                    params: &Value::Null,
                })
                .map_err(|e| TransitionError::Action {
                    action_type: format!("delay({name})"),
                    message: e.message,
                })
            }
        }
    }
}

fn delivery_params(to: Option<&String>, event: &Event, delay: Option<u64>, id: &Option<String>) -> Value {
    let mut params = Map::new();
    if let Some(to) = to {
        params.insert("to".to_string(), Value::String(to.clone()));
    }
    params.insert("event".to_string(), event.to_value());
    if let Some(delay) = delay {
        params.insert("delay".to_string(), Value::from(delay));
    }
    if let Some(id) = id {
        params.insert("id".to_string(), Value::String(id.clone()));
    }
    Value::Object(params)
}

/// Object patches merge shallowly into an object context; anything else
/// replaces the context.
fn merge_context(context: &Value, patch: Value) -> Value {
    match (context, patch) {
        (Value::Object(current), Value::Object(patch)) => {
            let mut merged = current.clone();
            merged.extend(patch);
            Value::Object(merged)
        }
        (Value::Null, Value::Object(patch)) => Value::Object(patch),
        (_, patch) => patch,
    }
}
