//! State values: the plain-data shape of an active configuration.
//!
//! A configuration is written as a string for a single active leaf under
//! the root (`"green"`), or as a nested object for deeper or parallel
//! configurations (`{"walk": "blinking"}`, `{"bold": "on", "italic": {}}`).
//! Dotted strings (`"walk.blinking"`) are shorthand for the nested form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Leaf(String),
    Branch(BTreeMap<String, StateValue>),
}

impl Default for StateValue {
    fn default() -> Self {
        StateValue::Branch(BTreeMap::new())
    }
}

impl StateValue {
    /// Build a nested value from a key path; `["a", "b"]` becomes `{"a": "b"}`.
    pub fn from_path<S: AsRef<str>>(path: &[S]) -> Self {
        match path {
            [] => StateValue::default(),
            [leaf] => StateValue::Leaf(leaf.as_ref().to_string()),
            [head, rest @ ..] => StateValue::Branch(BTreeMap::from([(
                head.as_ref().to_string(),
                StateValue::from_path(rest),
            )])),
        }
    }

    /// Expand dotted leaves into nested branches.
    pub fn normalized(&self) -> StateValue {
        match self {
            StateValue::Leaf(leaf) if leaf.contains('.') => {
                let path: Vec<&str> = leaf.split('.').collect();
                StateValue::from_path(&path)
            }
            StateValue::Leaf(leaf) => StateValue::Leaf(leaf.clone()),
            StateValue::Branch(children) => StateValue::Branch(
                children
                    .iter()
                    .map(|(key, value)| (key.clone(), value.normalized()))
                    .collect(),
            ),
        }
    }

    /// Every key path described by the value, root-most first.
    pub fn paths(&self) -> Vec<Vec<String>> {
        match self.normalized() {
            StateValue::Leaf(leaf) => vec![vec![leaf]],
            StateValue::Branch(children) => {
                let mut paths = Vec::new();
                for (key, child) in children {
                    let nested = child.paths();
                    if nested.is_empty() {
                        paths.push(vec![key.clone()]);
                    }
                    for mut path in nested {
                        path.insert(0, key.clone());
                        paths.push(path);
                    }
                }
                paths
            }
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Leaf(value.to_string()).normalized()
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::from(value.as_str())
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// True when `parent` describes a subset of `child`.
///
/// `"a"` matches `{"a": "b"}`; `{"a": "b"}` matches `{"a": {"b": "c"}}`;
/// leaves only match equal leaves.
pub fn matches_state(parent: &StateValue, child: &StateValue) -> bool {
    match (parent.normalized(), child.normalized()) {
        (StateValue::Leaf(p), StateValue::Leaf(c)) => p == c,
        (StateValue::Branch(_), StateValue::Leaf(_)) => false,
        (StateValue::Leaf(p), StateValue::Branch(c)) => c.contains_key(&p),
        (StateValue::Branch(p), StateValue::Branch(c)) => p.iter().all(|(key, value)| {
            c.get(key)
                .map(|child_value| matches_state(value, child_value))
                .unwrap_or(false)
        }),
    }
}
