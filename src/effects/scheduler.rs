//! Logical-clock scheduler for delayed events.

use crate::core::Event;
use std::collections::BTreeMap;

/// Where a scheduled event is delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// The actor that scheduled it.
    Own,
    Parent,
    Child(String),
}

impl Recipient {
    pub fn from_target(target: &str) -> Self {
        match target {
            crate::core::action::PARENT_TARGET => Recipient::Parent,
            child => Recipient::Child(child.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub id: Option<String>,
    /// Logical time in milliseconds at which the event fires.
    pub due: u64,
    pub recipient: Recipient,
    pub event: Event,
}

/// Pending delayed events, ordered by due time then by scheduling order.
///
/// Time only moves when the owner advances it, so tests control delays
/// exactly.
#[derive(Debug, Default)]
pub struct Scheduler {
    now: u64,
    sequence: u64,
    pending: BTreeMap<(u64, u64), ScheduledEvent>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn schedule(&mut self, delay: u64, recipient: Recipient, event: Event, id: Option<String>) {
        let due = self.now.saturating_add(delay);
        self.sequence += 1;
        tracing::trace!(event = %event.event_type, due, id = ?id, "scheduled delayed event");
        self.pending.insert(
            (due, self.sequence),
            ScheduledEvent {
                id,
                due,
                recipient,
                event,
            },
        );
    }

    /// Drop every pending event with send id `id`. Returns how many were
    /// removed.
    pub fn cancel(&mut self, id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, scheduled| scheduled.id.as_deref() != Some(id));
        before - self.pending.len()
    }

    /// Pop the earliest event due at or before `until`, moving the clock to
    /// its due time.
    pub fn next_due(&mut self, until: u64) -> Option<ScheduledEvent> {
        let key = *self.pending.keys().next()?;
        if key.0 > until {
            return None;
        }
        let scheduled = self.pending.remove(&key)?;
        self.now = self.now.max(scheduled.due);
        Some(scheduled)
    }

    pub fn advance_to(&mut self, time: u64) {
        self.now = self.now.max(time);
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut Scheduler, until: u64) -> Vec<String> {
        let mut fired = Vec::new();
        while let Some(scheduled) = scheduler.next_due(until) {
            fired.push(scheduled.event.event_type);
        }
        scheduler.advance_to(until);
        fired
    }

    #[test]
    fn fires_in_due_then_schedule_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(200, Recipient::Own, Event::new("LATE"), None);
        scheduler.schedule(100, Recipient::Own, Event::new("FIRST"), None);
        scheduler.schedule(100, Recipient::Own, Event::new("SECOND"), None);

        assert_eq!(drain(&mut scheduler, 150), vec!["FIRST", "SECOND"]);
        assert_eq!(scheduler.now(), 150);
        assert_eq!(drain(&mut scheduler, 250), vec!["LATE"]);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn delays_are_relative_to_the_clock() {
        let mut scheduler = Scheduler::new();
        scheduler.advance_to(1000);
        scheduler.schedule(50, Recipient::Parent, Event::new("PING"), None);

        assert!(drain(&mut scheduler, 1049).is_empty());
        assert_eq!(drain(&mut scheduler, 1050), vec!["PING"]);
    }

    #[test]
    fn cancel_removes_by_id() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(10, Recipient::Own, Event::new("A"), Some("timer".to_string()));
        scheduler.schedule(20, Recipient::Own, Event::new("B"), Some("other".to_string()));

        assert_eq!(scheduler.cancel("timer"), 1);
        assert_eq!(scheduler.cancel("missing"), 0);
        assert_eq!(drain(&mut scheduler, 100), vec!["B"]);
    }

    #[test]
    fn recipient_from_target() {
        assert_eq!(Recipient::from_target("_parent"), Recipient::Parent);
        assert_eq!(Recipient::from_target("worker"), Recipient::Child("worker".to_string()));
    }
}
