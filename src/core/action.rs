//! Action definitions and resolved action descriptors.
//!
//! [`Action`] is what a machine definition declares: built-in actions with
//! typed parameters, or user-defined actions referenced by type. The engine
//! resolves every dynamic part (computed events, delays, assignments) and
//! hands the executor a list of [`ActionDescriptor`]s that need no further
//! access to context.

use crate::core::event::Event;
use crate::graph::DefinitionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ASSIGN: &str = "xstate.assign";
pub const RAISE: &str = "xstate.raise";
pub const SEND_TO: &str = "xstate.sendTo";
pub const CANCEL: &str = "xstate.cancel";
pub const LOG: &str = "xstate.log";
pub const EMIT: &str = "xstate.emit";
pub const SPAWN_CHILD: &str = "xstate.spawnChild";
pub const STOP_CHILD: &str = "xstate.stopChild";

/// Target of `sendTo` that addresses the parent actor.
pub const PARENT_TARGET: &str = "_parent";

/// A fully resolved, executable action.
///
/// Serializes as `{"type": ..., "params": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub params: Value,
}

impl ActionDescriptor {
    pub fn new(action_type: impl Into<String>, params: Value) -> Self {
        Self {
            action_type: action_type.into(),
            params,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.action_type.starts_with("xstate.")
    }

    /// Delay in milliseconds for `raise`/`sendTo` descriptors.
    pub fn delay(&self) -> Option<u64> {
        self.params.get("delay").and_then(Value::as_u64)
    }

    /// The send id of `raise`/`sendTo`/`cancel` descriptors.
    pub fn send_id(&self) -> Option<&str> {
        self.params.get("id").and_then(Value::as_str)
    }

    /// The event carried by `raise`/`sendTo`/`emit` descriptors.
    pub fn event(&self) -> Option<Event> {
        self.params
            .get("event")
            .cloned()
            .and_then(|value| Event::from_value(value).ok())
    }
}

/// A delay expressed in milliseconds or by the name of a registered delay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Delay {
    Millis(u64),
    Named(String),
}

impl Delay {
    /// Parse an `after` key: numeric keys are milliseconds.
    pub fn from_key(key: &str) -> Self {
        match key.parse::<u64>() {
            Ok(ms) => Delay::Millis(ms),
            Err(_) => Delay::Named(key.to_string()),
        }
    }
}

/// The event an action sends: a type, a literal event, or a named event
/// builder from the implementation registry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventExpr {
    Type(String),
    Literal(Event),
    Computed { expr: String },
}

/// A context assignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignment {
    /// Static fields merged into the context.
    Patch { patch: Map<String, Value> },
    /// A registered assigner that computes the patch.
    Named {
        assign: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RaiseParams {
    pub event: EventExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendToParams {
    pub to: String,
    pub event: EventExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<Delay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpawnParams {
    pub src: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct EmitParams {
    event: EventExpr,
}

/// An action as declared in a machine definition.
///
/// In definition data an action is either a string (a user-defined action
/// type without params) or `{"type": ..., "params": ...}`.
///
/// # Example
///
/// ```rust
/// use harel::core::Action;
/// use serde_json::json;
///
/// let actions: Vec<Action> = serde_json::from_value(json!([
///     "notify",
///     {"type": "xstate.raise", "params": {"event": "PING", "delay": 500}},
///     {"type": "xstate.assign", "params": {"patch": {"count": 0}}}
/// ])).unwrap();
///
/// assert_eq!(actions[0], Action::custom("notify"));
/// assert!(matches!(actions[1], Action::Raise(_)));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum Action {
    Assign(Assignment),
    Raise(RaiseParams),
    SendTo(SendToParams),
    Cancel { id: String },
    Log(LogParams),
    Emit { event: EventExpr },
    SpawnChild(SpawnParams),
    StopChild { id: String },
    Custom { action_type: String, params: Value },
}

impl Action {
    pub fn custom(action_type: impl Into<String>) -> Self {
        Action::Custom {
            action_type: action_type.into(),
            params: Value::Null,
        }
    }

    pub fn custom_with(action_type: impl Into<String>, params: Value) -> Self {
        Action::Custom {
            action_type: action_type.into(),
            params,
        }
    }

    /// Assign through a registered assigner.
    pub fn assign(name: impl Into<String>) -> Self {
        Action::Assign(Assignment::Named {
            assign: name.into(),
            params: Value::Null,
        })
    }

    /// Merge static fields into the context.
    pub fn assign_patch(patch: Map<String, Value>) -> Self {
        Action::Assign(Assignment::Patch { patch })
    }

    pub fn raise(event: impl Into<Event>) -> Self {
        Action::Raise(RaiseParams {
            event: EventExpr::Literal(event.into()),
            delay: None,
            id: None,
        })
    }

    pub fn raise_after(event: impl Into<Event>, delay: Delay, id: impl Into<String>) -> Self {
        Action::Raise(RaiseParams {
            event: EventExpr::Literal(event.into()),
            delay: Some(delay),
            id: Some(id.into()),
        })
    }

    pub fn send_to(to: impl Into<String>, event: impl Into<Event>) -> Self {
        Action::SendTo(SendToParams {
            to: to.into(),
            event: EventExpr::Literal(event.into()),
            delay: None,
            id: None,
        })
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Action::Cancel { id: id.into() }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Action::Log(LogParams {
            label: None,
            message: Some(message.into()),
        })
    }

    pub fn emit(event: impl Into<Event>) -> Self {
        Action::Emit {
            event: EventExpr::Literal(event.into()),
        }
    }

    pub fn spawn_child(src: impl Into<String>, id: impl Into<String>) -> Self {
        Action::SpawnChild(SpawnParams {
            src: src.into(),
            id: id.into(),
            input: None,
        })
    }

    pub fn stop_child(id: impl Into<String>) -> Self {
        Action::StopChild { id: id.into() }
    }

    /// The action's type tag.
    pub fn action_type(&self) -> &str {
        match self {
            Action::Assign(_) => ASSIGN,
            Action::Raise(_) => RAISE,
            Action::SendTo(_) => SEND_TO,
            Action::Cancel { .. } => CANCEL,
            Action::Log(_) => LOG,
            Action::Emit { .. } => EMIT,
            Action::SpawnChild(_) => SPAWN_CHILD,
            Action::StopChild { .. } => STOP_CHILD,
            Action::Custom { action_type, .. } => action_type,
        }
    }
}

/// Wire form of an action in definition data.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAction {
    Named(String),
    Object {
        #[serde(rename = "type")]
        action_type: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
    },
}

fn parse_params<T: serde::de::DeserializeOwned>(
    action_type: &str,
    params: Value,
) -> Result<T, DefinitionError> {
    serde_json::from_value(params).map_err(|e| DefinitionError::InvalidAction {
        action_type: action_type.to_string(),
        reason: e.to_string(),
    })
}

impl TryFrom<RawAction> for Action {
    type Error = DefinitionError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let (action_type, params) = match raw {
            RawAction::Named(action_type) => (action_type, Value::Null),
            RawAction::Object {
                action_type,
                params,
            } => (action_type, params),
        };

        let action = match action_type.as_str() {
            ASSIGN => Action::Assign(parse_params(&action_type, params)?),
            RAISE => Action::Raise(parse_params(&action_type, params)?),
            SEND_TO => Action::SendTo(parse_params(&action_type, params)?),
            CANCEL => {
                let IdParams { id } = parse_params(&action_type, params)?;
                Action::Cancel { id }
            }
            LOG => {
                if params.is_null() {
                    Action::Log(LogParams {
                        label: None,
                        message: None,
                    })
                } else {
                    Action::Log(parse_params(&action_type, params)?)
                }
            }
            EMIT => {
                let EmitParams { event } = parse_params(&action_type, params)?;
                Action::Emit { event }
            }
            SPAWN_CHILD => Action::SpawnChild(parse_params(&action_type, params)?),
            STOP_CHILD => {
                let IdParams { id } = parse_params(&action_type, params)?;
                Action::StopChild { id }
            }
            other if other.starts_with("xstate.") => {
                return Err(DefinitionError::InvalidAction {
                    action_type,
                    reason: "unknown built-in action".to_string(),
                })
            }
            _ => Action::Custom {
                action_type,
                params,
            },
        };
        Ok(action)
    }
}

impl From<Action> for RawAction {
    fn from(action: Action) -> Self {
        let action_type = action.action_type().to_string();
        let params = match action {
            Action::Assign(assignment) => serde_json::to_value(assignment).unwrap_or_default(),
            Action::Raise(params) => serde_json::to_value(params).unwrap_or_default(),
            Action::SendTo(params) => serde_json::to_value(params).unwrap_or_default(),
            Action::Cancel { id } | Action::StopChild { id } => {
                serde_json::to_value(IdParams { id }).unwrap_or_default()
            }
            Action::Log(params) => serde_json::to_value(params).unwrap_or_default(),
            Action::Emit { event } => serde_json::to_value(EmitParams { event }).unwrap_or_default(),
            Action::SpawnChild(params) => serde_json::to_value(params).unwrap_or_default(),
            Action::Custom { params, .. } => params,
        };
        if params.is_null() {
            RawAction::Named(action_type)
        } else {
            RawAction::Object {
                action_type,
                params,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_action_is_custom() {
        let action: Action = serde_json::from_value(json!("track")).unwrap();
        assert_eq!(action, Action::custom("track"));
    }

    #[test]
    fn builtin_actions_parse_typed_params() {
        let action: Action = serde_json::from_value(json!({
            "type": "xstate.sendTo",
            "params": {"to": "child", "event": {"type": "PING", "n": 1}, "delay": "slow"}
        }))
        .unwrap();

        match action {
            Action::SendTo(params) => {
                assert_eq!(params.to, "child");
                assert_eq!(params.delay, Some(Delay::Named("slow".to_string())));
                assert!(matches!(params.event, EventExpr::Literal(_)));
            }
            other => panic!("expected sendTo, got {other:?}"),
        }
    }

    #[test]
    fn named_assignment_parses() {
        let action: Action = serde_json::from_value(json!({
            "type": "xstate.assign",
            "params": {"assign": "increment", "params": {"by": 2}}
        }))
        .unwrap();

        assert_eq!(
            action,
            Action::Assign(Assignment::Named {
                assign: "increment".to_string(),
                params: json!({"by": 2}),
            })
        );
    }

    #[test]
    fn unknown_builtin_is_rejected() {
        let result: Result<Action, _> = serde_json::from_value(json!("xstate.teleport"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_builtin_params_are_rejected() {
        let result: Result<Action, _> =
            serde_json::from_value(json!({"type": "xstate.cancel", "params": {"nope": 1}}));
        assert!(result.is_err());
    }

    #[test]
    fn actions_round_trip_through_wire_form() {
        let actions = vec![
            Action::custom("notify"),
            Action::raise_after("TIMEOUT", Delay::Millis(100), "t1"),
            Action::cancel("t1"),
            Action::log("hello"),
            Action::spawn_child("worker", "w1"),
        ];
        let value = serde_json::to_value(&actions).unwrap();
        let back: Vec<Action> = serde_json::from_value(value).unwrap();
        assert_eq!(back, actions);
    }

    #[test]
    fn descriptor_accessors() {
        let descriptor = ActionDescriptor::new(
            RAISE,
            json!({"event": {"type": "TICK"}, "delay": 250, "id": "tick"}),
        );
        assert_eq!(descriptor.delay(), Some(250));
        assert_eq!(descriptor.send_id(), Some("tick"));
        assert_eq!(descriptor.event(), Some(Event::new("TICK")));
        assert!(descriptor.is_builtin());
    }
}
