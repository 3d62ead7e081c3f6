//! The effectful actor shell around the pure engine, built on Stillwater 0.11.0.
//!
//! This module provides the "imperative shell": it owns snapshots, sequences
//! events through a mailbox and executes the action descriptors the engine
//! returns.
//!
//! # Key Concepts
//!
//! - **Actor**: One running machine instance with a lifecycle
//! - **Executors**: User actions run as Stillwater effects over an environment
//! - **Scheduler**: Delayed events on a logical clock, cancellable by id
//! - **Journal**: Replayable record of committed snapshots
//! - **Inspection**: Injectable registry of running sessions
//!
//! Following Stillwater 0.11.0 conventions, executors store factories that
//! produce a fresh `BoxedEffect` per descriptor.

mod actor;
mod error;
mod inspect;
mod journal;
mod logic;
mod scheduler;

pub use actor::{ActionExecutor, Actor, EmitListener, Lifecycle, Subscriber, DEFAULT_JOURNAL_CAPACITY};
pub use error::ActorError;
pub use inspect::{InspectedActor, InspectionEvent, InspectionListener, InspectionRegistry};
pub use journal::{JournalEntry, ReplayError, SnapshotJournal};
pub use logic::ActorLogic;
pub use scheduler::{Recipient, ScheduledEvent, Scheduler};
