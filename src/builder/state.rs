//! Builder for constructing state nodes.

use crate::builder::error::BuildError;
use crate::builder::transition::TransitionBuilder;
use crate::core::Action;
use crate::definition::{
    HistoryType, InvokeConfig, OneOrMany, OrderedMap, StateConfig, StateType, TransitionConfig,
};
use serde_json::Value;

/// Builder for one state node and its children.
#[derive(Clone, Debug, Default)]
pub struct StateBuilder {
    config: StateConfig,
    children: Vec<(String, StateBuilder)>,
    on: Vec<(String, TransitionBuilder)>,
    always: Vec<TransitionBuilder>,
    after: Vec<(String, TransitionBuilder)>,
    on_done: Vec<TransitionBuilder>,
}

impl StateBuilder {
    /// An atomic state, or a compound one once children are added.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self::new().kind(StateType::Parallel)
    }

    pub fn final_state() -> Self {
        Self::new().kind(StateType::Final)
    }

    pub fn history(history: HistoryType) -> Self {
        let mut builder = Self::new().kind(StateType::History);
        builder.config.history = Some(history);
        builder
    }

    fn kind(mut self, kind: StateType) -> Self {
        self.config.kind = Some(kind);
        self
    }

    /// Explicit id, addressable as `#id`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = Some(id.into());
        self
    }

    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.config.initial = Some(key.into());
        self
    }

    pub fn state(mut self, key: impl Into<String>, state: StateBuilder) -> Self {
        self.children.push((key.into(), state));
        self
    }

    pub fn on(mut self, event: impl Into<String>, transition: TransitionBuilder) -> Self {
        self.on.push((event.into(), transition));
        self
    }

    pub fn always(mut self, transition: TransitionBuilder) -> Self {
        self.always.push(transition);
        self
    }

    /// Delayed transition; `delay` is milliseconds or a registered delay name.
    pub fn after(mut self, delay: impl ToString, transition: TransitionBuilder) -> Self {
        self.after.push((delay.to_string(), transition));
        self
    }

    pub fn on_done(mut self, transition: TransitionBuilder) -> Self {
        self.on_done.push(transition);
        self
    }

    pub fn entry(mut self, action: Action) -> Self {
        self.config.entry.push(action);
        self
    }

    pub fn exit(mut self, action: Action) -> Self {
        self.config.exit.push(action);
        self
    }

    pub fn invoke(mut self, invoke: InvokeConfig) -> Self {
        self.config.invoke.push(invoke);
        self
    }

    /// Default target of a history state.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.target.push(target.into());
        self
    }

    pub fn output(mut self, output: Value) -> Self {
        self.config.output = Some(output);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.config.tags.push(tag.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.config.meta = Some(meta);
        self
    }

    /// Build the state definition, children included.
    pub fn build(self, key: &str) -> Result<StateConfig, BuildError> {
        let mut config = self.config;
        if !config.target.is_empty() && config.kind != Some(StateType::History) {
            return Err(BuildError::TargetOnNonHistory {
                key: key.to_string(),
            });
        }

        let mut states = OrderedMap::new();
        for (child_key, child) in self.children {
            if states.contains_key(&child_key) {
                return Err(BuildError::DuplicateState { key: child_key });
            }
            let child = child.build(&child_key)?;
            states.insert(child_key, child);
        }
        config.states = states;
        config.on = group(self.on)?;
        config.after = group(self.after)?;
        config.always = build_all(self.always)?;
        config.on_done = build_all(self.on_done)?;
        Ok(config)
    }
}

fn build_all(builders: Vec<TransitionBuilder>) -> Result<OneOrMany<TransitionConfig>, BuildError> {
    builders
        .into_iter()
        .map(TransitionBuilder::build)
        .collect::<Result<Vec<_>, _>>()
        .map(OneOrMany)
}

/// Group transitions by key, keeping first-seen key order.
fn group(
    builders: Vec<(String, TransitionBuilder)>,
) -> Result<OrderedMap<OneOrMany<TransitionConfig>>, BuildError> {
    let mut grouped: OrderedMap<OneOrMany<TransitionConfig>> = OrderedMap::new();
    for (key, builder) in builders {
        let transition = builder.build()?;
        match grouped.get_mut(&key) {
            Some(existing) => existing.push(transition),
            None => grouped.insert(key, OneOrMany(vec![transition])),
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_events_keep_alternatives_in_order() {
        let state = StateBuilder::new()
            .on("E", TransitionBuilder::new().to("a").when("first"))
            .on("F", TransitionBuilder::new().to("c"))
            .on("E", TransitionBuilder::new().to("b"))
            .build("s")
            .unwrap();

        let keys: Vec<&str> = state.on.keys().collect();
        assert_eq!(keys, vec!["E", "F"]);
        let targets: Vec<&str> = state
            .on
            .get("E")
            .unwrap()
            .iter()
            .map(|t| t.target.0[0].as_str())
            .collect();
        assert_eq!(targets, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_children_are_rejected() {
        let result = StateBuilder::new()
            .state("a", StateBuilder::new())
            .state("a", StateBuilder::new())
            .build("root");
        assert_eq!(result, Err(BuildError::DuplicateState { key: "a".to_string() }));
    }

    #[test]
    fn target_is_only_for_history_states() {
        let result = StateBuilder::new().target("x").build("s");
        assert!(matches!(result, Err(BuildError::TargetOnNonHistory { .. })));

        let history = StateBuilder::history(HistoryType::Deep).target("x").build("h").unwrap();
        assert_eq!(history.kind, Some(StateType::History));
        assert_eq!(history.target.0, vec!["x".to_string()]);
    }

    #[test]
    fn invalid_nested_transition_fails_the_whole_build() {
        let result = StateBuilder::new()
            .state("a", StateBuilder::new().after(100, TransitionBuilder::new().to(" ")))
            .build("root");
        assert_eq!(result, Err(BuildError::EmptyTarget));
    }
}
