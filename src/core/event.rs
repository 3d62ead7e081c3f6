//! Events and event descriptors.
//!
//! An event is a plain-data value with a `type` tag and arbitrary extra
//! fields. Transitions are keyed by *descriptors*, which are either an exact
//! event type, the bare wildcard `*`, or a prefix pattern such as
//! `"mouse.*"`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type sent once when a machine is started.
pub const INIT_EVENT: &str = "xstate.init";

/// Event type that stops a machine.
pub const STOP_EVENT: &str = "xstate.stop";

/// The bare wildcard descriptor.
pub const WILDCARD: &str = "*";

const DONE_STATE_PREFIX: &str = "xstate.done.state.";
const DONE_ACTOR_PREFIX: &str = "xstate.done.actor.";
const ERROR_ACTOR_PREFIX: &str = "xstate.error.actor.";
const AFTER_PREFIX: &str = "xstate.after.";

/// An event delivered to a machine.
///
/// Serializes as a flat object: `{"type": "KEY", "key": "a"}`.
///
/// # Example
///
/// ```rust
/// use harel::core::Event;
/// use serde_json::json;
///
/// let event = Event::new("KEY").with("key", json!("a"));
/// assert_eq!(event.event_type, "KEY");
/// assert_eq!(event.get("key"), Some(&json!("a")));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
        }
    }

    /// Attach a field to the event.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Events in the `xstate.` namespace are produced by the runtime itself.
    pub fn is_builtin(&self) -> bool {
        self.event_type.starts_with("xstate.")
    }

    pub fn is_error_actor_event(&self) -> bool {
        self.event_type.starts_with(ERROR_ACTOR_PREFIX)
    }

    /// Build an event from a JSON value, accepting a bare string as the type.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(event_type) => Ok(Event::new(event_type)),
            other => serde_json::from_value(other),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut object = self.data.clone();
        object.insert("type".to_string(), Value::String(self.event_type.clone()));
        Value::Object(object)
    }
}

impl From<&str> for Event {
    fn from(event_type: &str) -> Self {
        Event::new(event_type)
    }
}

impl From<String> for Event {
    fn from(event_type: String) -> Self {
        Event::new(event_type)
    }
}

pub fn init_event(input: Option<Value>) -> Event {
    let event = Event::new(INIT_EVENT);
    match input {
        Some(input) => event.with("input", input),
        None => event,
    }
}

pub fn stop_event() -> Event {
    Event::new(STOP_EVENT)
}

pub fn done_state_event_type(state_id: &str) -> String {
    format!("{DONE_STATE_PREFIX}{state_id}")
}

pub fn done_state_event(state_id: &str, output: Option<Value>) -> Event {
    let event = Event::new(done_state_event_type(state_id));
    match output {
        Some(output) => event.with("output", output),
        None => event,
    }
}

pub fn done_actor_event_type(actor_id: &str) -> String {
    format!("{DONE_ACTOR_PREFIX}{actor_id}")
}

pub fn done_actor_event(actor_id: &str, output: Option<Value>) -> Event {
    let event = Event::new(done_actor_event_type(actor_id));
    match output {
        Some(output) => event.with("output", output),
        None => event,
    }
}

pub fn error_actor_event_type(actor_id: &str) -> String {
    format!("{ERROR_ACTOR_PREFIX}{actor_id}")
}

pub fn error_actor_event(actor_id: &str, error: impl Into<String>) -> Event {
    Event::new(error_actor_event_type(actor_id)).with("error", Value::String(error.into()))
}

/// Event type used by the delayed transitions of `state_id`.
pub fn after_event_type(delay: &str, state_id: &str) -> String {
    format!("{AFTER_PREFIX}{delay}.{state_id}")
}

/// Whether `descriptor` is a wildcard pattern rather than an exact type.
pub fn is_wildcard_descriptor(descriptor: &str) -> bool {
    descriptor == WILDCARD || descriptor.ends_with(".*")
}

/// Check whether an event type is matched by a transition descriptor.
///
/// Matching is token based: `"a.*"` matches `"a"`, `"a.b"` and `"a.b.c"`
/// but not `"ab"`. A `*` that is not the last token never matches.
///
/// # Example
///
/// ```rust
/// use harel::core::event::descriptor_matches;
///
/// assert!(descriptor_matches("mouse.*", "mouse.click"));
/// assert!(descriptor_matches("*", "anything"));
/// assert!(!descriptor_matches("mouse.*", "mousemove"));
/// ```
pub fn descriptor_matches(descriptor: &str, event_type: &str) -> bool {
    if descriptor == event_type || descriptor == WILDCARD {
        return true;
    }
    if !descriptor.ends_with(".*") {
        return false;
    }

    let descriptor_tokens: Vec<&str> = descriptor.split('.').collect();
    let event_tokens: Vec<&str> = event_type.split('.').collect();
    let last = descriptor_tokens.len() - 1;

    for (index, token) in descriptor_tokens.iter().enumerate() {
        if *token == "*" {
            return index == last;
        }
        if event_tokens.get(index) != Some(token) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_flat() {
        let event = Event::new("SUBMIT").with("amount", json!(10));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "SUBMIT", "amount": 10}));

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn from_value_accepts_bare_string() {
        let event = Event::from_value(json!("NEXT")).unwrap();
        assert_eq!(event, Event::new("NEXT"));
    }

    #[test]
    fn exact_descriptor_matches_only_itself() {
        assert!(descriptor_matches("NEXT", "NEXT"));
        assert!(!descriptor_matches("NEXT", "NEXT.more"));
    }

    #[test]
    fn prefix_descriptor_matches_by_token() {
        assert!(descriptor_matches("mouse.*", "mouse"));
        assert!(descriptor_matches("mouse.*", "mouse.move"));
        assert!(descriptor_matches("mouse.*", "mouse.move.fast"));
        assert!(!descriptor_matches("mouse.*", "mousemove"));
        assert!(!descriptor_matches("mouse.move.*", "mouse.click"));
    }

    #[test]
    fn inner_wildcard_never_matches() {
        assert!(!descriptor_matches("a.*.c", "a.b.c"));
    }

    #[test]
    fn builtin_event_helpers() {
        assert_eq!(done_state_event_type("m.a"), "xstate.done.state.m.a");
        assert_eq!(after_event_type("1000", "m.a"), "xstate.after.1000.m.a");
        assert!(error_actor_event("child", "boom").is_error_actor_event());
        assert!(init_event(None).is_builtin());
        assert_eq!(
            done_actor_event("child", Some(json!(1))).get("output"),
            Some(&json!(1))
        );
    }
}
