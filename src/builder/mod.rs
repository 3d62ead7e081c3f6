//! Builder API for ergonomic machine construction.
//!
//! This module provides fluent builders that produce the same plain-data
//! [`crate::definition::MachineConfig`] a JSON definition deserializes to.

pub mod error;
pub mod machine;
pub mod state;
pub mod transition;

pub use error::BuildError;
pub use machine::MachineBuilder;
pub use state::StateBuilder;
pub use transition::TransitionBuilder;

/// Create a simple unconditional transition.
///
/// # Example
///
/// ```
/// use harel::builder::{simple_transition, MachineBuilder, StateBuilder};
///
/// let machine = MachineBuilder::new("door")
///     .initial("closed")
///     .state("closed", StateBuilder::new().on("OPEN", simple_transition("opened")))
///     .state("opened", StateBuilder::new())
///     .build()
///     .unwrap();
/// ```
pub fn simple_transition(target: impl Into<String>) -> TransitionBuilder {
    TransitionBuilder::new().to(target)
}

/// Create a transition guarded by a named predicate.
///
/// # Example
///
/// ```
/// use harel::builder::guarded_transition;
///
/// let transition = guarded_transition("next", "isValid").build().unwrap();
/// assert!(transition.guard.is_some());
/// ```
pub fn guarded_transition(target: impl Into<String>, guard: impl Into<String>) -> TransitionBuilder {
    TransitionBuilder::new().to(target).when(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::GuardConfig;
    use crate::registry::ImplementationRegistry;

    #[test]
    fn simple_transition_builds() {
        let transition = simple_transition("middle").build().unwrap();
        assert_eq!(transition.target.0, vec!["middle".to_string()]);
        assert!(transition.guard.is_none());
    }

    #[test]
    fn guarded_transition_respects_guard() {
        let machine = MachineBuilder::new("m")
            .initial("start")
            .state(
                "start",
                StateBuilder::new()
                    .on("GO", guarded_transition("end", "ready"))
                    .on("GO", simple_transition("fallback")),
            )
            .state("end", StateBuilder::new())
            .state("fallback", StateBuilder::new())
            .build()
            .unwrap();

        let transition = guarded_transition("end", "ready").build().unwrap();
        assert_eq!(transition.guard, Some(GuardConfig::Named("ready".to_string())));

        let blocked = machine.provide(ImplementationRegistry::new().guard("ready", |_| Ok(false)));
        let (snapshot, _) = blocked.initial_transition(None).unwrap();
        let (snapshot, _) = blocked.transition(&snapshot, "GO").unwrap();
        assert!(snapshot.matches("fallback"));

        let open = machine.provide(ImplementationRegistry::new().guard("ready", |_| Ok(true)));
        let (snapshot, _) = open.initial_transition(None).unwrap();
        let (snapshot, _) = open.transition(&snapshot, "GO").unwrap();
        assert!(snapshot.matches("end"));
    }
}
