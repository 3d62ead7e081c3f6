//! Committed-snapshot journal.
//!
//! Provides immutable tracking of every snapshot an actor committed and the
//! event that produced it. Because the engine is deterministic, replaying
//! the journaled events through the same machine yields the same snapshots.

use crate::core::event::INIT_EVENT;
use crate::core::{Event, StateValue};
use crate::engine::TransitionError;
use crate::machine::Machine;
use crate::snapshot::{PersistedSnapshot, Snapshot, SnapshotError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// Record of a single committed macrostep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The external event that was processed
    pub event: Event,
    /// The snapshot committed after processing it
    pub snapshot: PersistedSnapshot,
    /// When the snapshot was committed
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Ordered journal of committed snapshots.
///
/// `record` returns a new journal with the entry added; `push` appends in
/// place. A bounded journal keeps only the most recent `capacity` entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotJournal {
    entries: VecDeque<JournalEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    capacity: Option<usize>,
}

impl SnapshotJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A journal that evicts its oldest entry once it holds `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Record an entry, returning a new journal.
    pub fn record(&self, entry: JournalEntry) -> Self {
        let mut journal = self.clone();
        journal.push(entry);
        journal
    }

    pub fn push(&mut self, entry: JournalEntry) {
        if self.capacity == Some(0) {
            return;
        }
        self.entries.push_back(entry);
        if let Some(capacity) = self.capacity {
            while self.entries.len() > capacity {
                self.entries.pop_front();
            }
        }
    }

    /// The sequence of state values the actor went through.
    pub fn path(&self) -> Vec<&StateValue> {
        self.entries.iter().map(|entry| &entry.snapshot.value).collect()
    }

    /// Time between the first and last entry.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.entries.front()?, self.entries.back()?);
        last.timestamp.signed_duration_since(first.timestamp).to_std().ok()
    }

    pub fn entries(&self) -> &VecDeque<JournalEntry> {
        &self.entries
    }

    pub fn last(&self) -> Option<&JournalEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recompute the final snapshot by feeding the journaled events back
    /// through `machine`. Returns `None` for an empty journal.
    ///
    /// A journal that no longer starts at the init event resumes from the
    /// snapshot of its oldest entry.
    pub fn replay(&self, machine: &Machine) -> Result<Option<Snapshot>, ReplayError> {
        let mut entries = self.entries.iter();
        let Some(first) = entries.next() else {
            return Ok(None);
        };

        let mut snapshot = if first.event.event_type == INIT_EVENT {
            machine.initial_transition(first.event.get("input").cloned())?.0
        } else {
            machine.resolve_state(&first.snapshot)?
        };
        for entry in entries {
            snapshot = machine.transition(&snapshot, entry.event.clone())?.0;
        }
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::init_event;
    use serde_json::json;

    fn machine() -> Machine {
        Machine::from_json(json!({
            "context": {"n": 0},
            "initial": "start",
            "states": {
                "start": {"on": {"GO": "middle"}},
                "middle": {"on": {"GO": "end"}},
                "end": {"type": "final"}
            }
        }))
        .unwrap()
    }

    fn journal_of(machine: &Machine, events: &[&str]) -> SnapshotJournal {
        let (mut snapshot, _) = machine.initial_transition(None).unwrap();
        let mut journal = SnapshotJournal::new().record(JournalEntry {
            event: init_event(None),
            snapshot: snapshot.persisted(),
            timestamp: Utc::now(),
        });
        for event in events {
            snapshot = machine.transition(&snapshot, *event).unwrap().0;
            journal = journal.record(JournalEntry {
                event: Event::new(*event),
                snapshot: snapshot.persisted(),
                timestamp: Utc::now(),
            });
        }
        journal
    }

    #[test]
    fn new_journal_is_empty() {
        let journal = SnapshotJournal::new();
        assert!(journal.is_empty());
        assert!(journal.path().is_empty());
        assert!(journal.duration().is_none());
        assert_eq!(journal.replay(&machine()).unwrap(), None);
    }

    #[test]
    fn record_is_immutable() {
        let machine = machine();
        let journal = journal_of(&machine, &[]);
        let longer = journal.record(journal.entries()[0].clone());

        assert_eq!(journal.len(), 1);
        assert_eq!(longer.len(), 2);
    }

    #[test]
    fn path_follows_committed_values() {
        let journal = journal_of(&machine(), &["GO", "GO"]);
        let path: Vec<String> = journal.path().iter().map(ToString::to_string).collect();
        assert_eq!(path, vec!["\"start\"", "\"middle\"", "\"end\""]);
        assert!(journal.duration().is_some());
    }

    #[test]
    fn replay_reproduces_last_snapshot() {
        let machine = machine();
        let journal = journal_of(&machine, &["GO", "GO"]);

        let replayed = journal.replay(&machine).unwrap().unwrap();
        assert_eq!(replayed.persisted(), journal.last().unwrap().snapshot);
    }

    #[test]
    fn push_appends_in_place() {
        let machine = machine();
        let mut journal = journal_of(&machine, &["GO"]);
        let entry = journal.entries()[0].clone();
        journal.push(entry);
        assert_eq!(journal.len(), 3);
    }

    #[test]
    fn bounded_journal_keeps_the_latest_entries() {
        let machine = machine();
        let full = journal_of(&machine, &["GO", "GO"]);
        let mut bounded = SnapshotJournal::with_capacity(2);
        for entry in full.entries() {
            bounded.push(entry.clone());
        }

        assert_eq!(bounded.len(), 2);
        assert_eq!(bounded.capacity(), Some(2));
        assert_eq!(bounded.entries()[0], full.entries()[1]);
        assert_eq!(bounded.last(), full.last());
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let machine = machine();
        let mut journal = SnapshotJournal::with_capacity(0);
        for entry in journal_of(&machine, &["GO"]).entries() {
            journal.push(entry.clone());
        }
        assert!(journal.is_empty());
    }

    #[test]
    fn truncated_journal_replays_from_its_oldest_snapshot() {
        let machine = Machine::from_json(json!({
            "context": {"n": 0},
            "initial": "start",
            "states": {
                "start": {"on": {"GO": "middle"}},
                "middle": {"on": {"GO": "end", "BACK": "start"}},
                "end": {"type": "final"}
            }
        }))
        .unwrap();
        let full = journal_of(&machine, &["GO", "BACK", "GO", "GO"]);
        let mut bounded = SnapshotJournal::with_capacity(2);
        for entry in full.entries() {
            bounded.push(entry.clone());
        }

        let replayed = bounded.replay(&machine).unwrap().unwrap();
        assert_eq!(replayed.persisted(), full.last().unwrap().snapshot);
        assert!(replayed.matches("end"));
    }
}
