//! Plain-data machine definitions.
//!
//! This is the format a machine is described in before it is compiled into
//! a [`crate::graph::StateGraph`]. It deserializes from the usual nested
//! JSON shape:
//!
//! ```json
//! {
//!   "id": "light",
//!   "initial": "green",
//!   "context": {"cycles": 0},
//!   "states": {
//!     "green":  {"on": {"TIMER": "yellow"}},
//!     "yellow": {"on": {"TIMER": "red"}},
//!     "red":    {"after": {"1000": "green"}}
//!   }
//! }
//! ```
//!
//! Object keys keep their document order.

mod ordered;

pub use ordered::OrderedMap;

use crate::core::Action;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A value that may be written as a single item or as a list.
#[derive(Clone, Debug, PartialEq)]
pub struct OneOrMany<T>(pub Vec<T>);

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, item: T) {
        self.0.push(item);
    }
}

impl<T> From<Vec<T>> for OneOrMany<T> {
    fn from(items: Vec<T>) -> Self {
        OneOrMany(items)
    }
}

impl<T: Serialize> Serialize for OneOrMany<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0.as_slice() {
            [single] => single.serialize(serializer),
            items => items.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OneOrMany<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Many(Vec<T>),
            One(T),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Many(items) => OneOrMany(items),
            Repr::One(item) => OneOrMany(vec![item]),
        })
    }
}

/// Top-level machine definition: a root state plus machine-wide fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default = "default_machine_id")]
    pub id: String,

    /// Initial extended state.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(flatten)]
    pub root: StateConfig,
}

fn default_machine_id() -> String {
    "machine".to_string()
}

impl MachineConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            context: Value::Null,
            version: None,
            root: StateConfig::default(),
        }
    }

    /// Object key order of `value` is document order.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn from_json_str(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Atomic,
    Compound,
    Parallel,
    Final,
    History,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryType {
    #[default]
    Shallow,
    Deep,
}

/// Definition of one state node and, recursively, its children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<StateType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<String>,

    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub states: OrderedMap<StateConfig>,

    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub on: OrderedMap<OneOrMany<TransitionConfig>>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub always: OneOrMany<TransitionConfig>,

    /// Delayed transitions keyed by milliseconds or a named delay.
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub after: OrderedMap<OneOrMany<TransitionConfig>>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub entry: OneOrMany<Action>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub exit: OneOrMany<Action>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub invoke: OneOrMany<InvokeConfig>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub on_done: OneOrMany<TransitionConfig>,

    /// Only for `type: "history"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryType>,

    /// Default target of a history state.
    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub target: OneOrMany<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub tags: OneOrMany<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// One transition alternative.
///
/// Deserializes from a bare target string or an object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "TransitionRepr")]
pub struct TransitionConfig {
    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub target: OneOrMany<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<GuardConfig>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub actions: OneOrMany<Action>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reenter: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TransitionConfig {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: OneOrMany(vec![target.into()]),
            ..Self::default()
        }
    }

    /// A transition that runs actions without changing state.
    pub fn targetless() -> Self {
        Self::default()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TransitionRepr {
    Target(String),
    Full {
        #[serde(default)]
        target: OneOrMany<String>,
        #[serde(default)]
        guard: Option<GuardConfig>,
        #[serde(default)]
        actions: OneOrMany<Action>,
        #[serde(default)]
        reenter: bool,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<TransitionRepr> for TransitionConfig {
    fn from(repr: TransitionRepr) -> Self {
        match repr {
            TransitionRepr::Target(target) => TransitionConfig::to(target),
            TransitionRepr::Full {
                target,
                guard,
                actions,
                reenter,
                description,
            } => TransitionConfig {
                target,
                guard,
                actions,
                reenter,
                description,
            },
        }
    }
}

/// Guard reference as written in a definition.
///
/// ```json
/// "isValid"
/// {"type": "isAbove", "params": {"min": 3}}
/// {"not": "isValid"}
/// {"and": ["isValid", {"stateIn": "#form.editing"}]}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuardConfig {
    Named(String),
    Not {
        not: Box<GuardConfig>,
    },
    And {
        and: Vec<GuardConfig>,
    },
    Or {
        or: Vec<GuardConfig>,
    },
    StateIn {
        #[serde(rename = "stateIn")]
        state_in: String,
    },
    Parameterized {
        #[serde(rename = "type")]
        name: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        params: Value,
    },
}

/// A child actor started while the owning state is active.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeConfig {
    /// Name of the actor logic to run.
    pub src: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub on_done: OneOrMany<TransitionConfig>,

    #[serde(default, skip_serializing_if = "OneOrMany::is_empty")]
    pub on_error: OneOrMany<TransitionConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_transition_shorthands() {
        let config = MachineConfig::from_json(json!({
            "id": "m",
            "initial": "a",
            "states": {
                "a": {
                    "on": {
                        "ONE": "b",
                        "TWO": {"target": "b", "guard": "ok", "actions": "log"},
                        "MANY": [
                            {"target": "b", "guard": {"not": "ok"}},
                            {"target": ["b"], "reenter": true}
                        ]
                    }
                },
                "b": {}
            }
        }))
        .unwrap();

        let a = config.root.states.get("a").unwrap();
        assert_eq!(a.on.get("ONE").unwrap().0, vec![TransitionConfig::to("b")]);

        let two = &a.on.get("TWO").unwrap().0[0];
        assert_eq!(two.guard, Some(GuardConfig::Named("ok".to_string())));
        assert_eq!(two.actions.0, vec![Action::custom("log")]);

        let many = &a.on.get("MANY").unwrap().0;
        assert_eq!(many.len(), 2);
        assert!(matches!(many[0].guard, Some(GuardConfig::Not { .. })));
        assert!(many[1].reenter);
    }

    #[test]
    fn parses_guard_combinators() {
        let guard: GuardConfig = serde_json::from_value(json!({
            "and": ["a", {"or": [{"stateIn": "#m.x"}, {"type": "above", "params": {"n": 1}}]}]
        }))
        .unwrap();

        match guard {
            GuardConfig::And { and } => {
                assert_eq!(and[0], GuardConfig::Named("a".to_string()));
                assert!(matches!(and[1], GuardConfig::Or { .. }));
            }
            other => panic!("expected and, got {other:?}"),
        }
    }

    #[test]
    fn machine_fields_are_separated_from_root_state() {
        let config = MachineConfig::from_json(json!({
            "id": "counter",
            "context": {"count": 0},
            "initial": "idle",
            "states": {"idle": {}}
        }))
        .unwrap();

        assert_eq!(config.id, "counter");
        assert_eq!(config.context, json!({"count": 0}));
        assert_eq!(config.root.id, None);
        assert_eq!(config.root.initial.as_deref(), Some("idle"));
    }

    #[test]
    fn state_order_follows_document() {
        let config = MachineConfig::from_json_str(
            r#"{"initial": "z", "states": {"z": {}, "a": {}, "m": {}}}"#,
        )
        .unwrap();
        let keys: Vec<&str> = config.root.states.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(config.id, "machine");
    }

    #[test]
    fn invoke_and_history_parse() {
        let state: StateConfig = serde_json::from_value(json!({
            "invoke": {"src": "fetcher", "id": "fetch", "onDone": "done", "onError": "failed"},
            "states": {
                "hist": {"type": "history", "history": "deep", "target": "one"},
                "one": {}
            }
        }))
        .unwrap();

        assert_eq!(state.invoke.0[0].src, "fetcher");
        assert_eq!(state.invoke.0[0].on_done.0, vec![TransitionConfig::to("done")]);
        let hist = state.states.get("hist").unwrap();
        assert_eq!(hist.kind, Some(StateType::History));
        assert_eq!(hist.history, Some(HistoryType::Deep));
    }
}
