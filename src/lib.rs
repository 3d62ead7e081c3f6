//! Harel: a pure statechart engine with an effectful actor shell
//!
//! Harel is built on Stillwater's "pure core, imperative shell" philosophy.
//! The engine computes, for a machine definition, a snapshot and an event,
//! the next snapshot and the ordered list of actions to execute, without
//! executing anything itself. Actions run in the actor shell as Stillwater
//! effects.
//!
//! # Core Concepts
//!
//! - **Definition**: Plain-data machine description, usually JSON
//! - **Graph**: The compiled, immutable state node tree
//! - **Snapshot**: Active configuration, context and status; serializable
//! - **Engine**: Microsteps and macrosteps with SCXML-style entry/exit order
//! - **Registry**: Named guards, assigners, events and delays, injected late
//! - **Actor**: Mailbox, scheduler, children and effect execution
//!
//! # Example
//!
//! ```rust
//! use harel::{ImplementationRegistry, Machine};
//! use serde_json::json;
//!
//! let machine = Machine::from_json(json!({
//!     "id": "counter",
//!     "context": {"count": 0},
//!     "initial": "active",
//!     "states": {
//!         "active": {
//!             "on": {
//!                 "INC": {"actions": {"type": "xstate.assign", "params": {"assign": "increment"}}},
//!                 "STOP": "stopped"
//!             }
//!         },
//!         "stopped": {"type": "final"}
//!     }
//! }))
//! .unwrap()
//! .provide(ImplementationRegistry::new().assigner("increment", |args| {
//!     Ok(json!({"count": args.context["count"].as_i64().unwrap_or(0) + 1}))
//! }));
//!
//! let (snapshot, _) = machine.initial_transition(None).unwrap();
//! let (snapshot, _) = machine.transition(&snapshot, "INC").unwrap();
//! assert_eq!(snapshot.context()["count"], 1);
//!
//! let (snapshot, _) = machine.transition(&snapshot, "STOP").unwrap();
//! assert_eq!(snapshot.status(), harel::SnapshotStatus::Done);
//! ```

pub mod builder;
pub mod checkpoint;
pub mod core;
pub mod definition;
pub mod effects;
pub mod engine;
pub mod graph;
pub mod machine;
pub mod registry;
pub mod snapshot;

// Re-export commonly used types
pub use core::{ActionDescriptor, Event, StateValue};
pub use definition::MachineConfig;
pub use engine::{EngineConfig, MacrostepResult, TransitionError};
pub use graph::DefinitionError;
pub use machine::Machine;
pub use registry::ImplementationRegistry;
pub use snapshot::{PersistedSnapshot, Snapshot, SnapshotStatus};
