//! Core statechart value types.
//!
//! This module contains the plain values the engine computes with:
//! - Events and event descriptors
//! - Declared actions and resolved action descriptors
//! - Guard expressions
//! - State values and history records
//!
//! Nothing in here performs side effects.

pub mod action;
pub mod event;
mod guard;
mod history;
mod state;

pub use action::{Action, ActionDescriptor, Assignment, Delay, EventExpr};
pub use event::Event;
pub use guard::{Guard, GuardScope};
pub use history::{recorded_nodes, HistoryValue};
pub use state::{matches_state, StateValue};
