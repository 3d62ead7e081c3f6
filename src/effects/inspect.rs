//! Registry of running actor sessions for inspection tooling.
//!
//! The registry is an ordinary value: create one, share it through an `Arc`
//! with the actors that should report to it, and drop it when done. Actors
//! register on start, report every committed snapshot, and unregister on
//! stop.

use crate::core::{Event, StateValue};
use crate::snapshot::SnapshotStatus;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Last known state of one running session.
#[derive(Clone, Debug, PartialEq)]
pub struct InspectedActor {
    pub session_id: String,
    pub machine_id: String,
    pub parent: Option<String>,
    pub started_at: DateTime<Utc>,
    pub status: SnapshotStatus,
    pub value: StateValue,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InspectionEvent {
    Registered { session_id: String, machine_id: String },
    Snapshot { session_id: String, event: Event, value: StateValue, status: SnapshotStatus },
    Unregistered { session_id: String },
}

pub type InspectionListener = Arc<dyn Fn(&InspectionEvent) + Send + Sync>;

#[derive(Default)]
pub struct InspectionRegistry {
    sessions: RwLock<BTreeMap<String, InspectedActor>>,
    listeners: RwLock<Vec<InspectionListener>>,
}

impl InspectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe registrations, snapshots and unregistrations from now on.
    pub fn listen<F>(&self, listener: F)
    where
        F: Fn(&InspectionEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn register(&self, actor: InspectedActor) {
        let event = InspectionEvent::Registered {
            session_id: actor.session_id.clone(),
            machine_id: actor.machine_id.clone(),
        };
        self.sessions.write().insert(actor.session_id.clone(), actor);
        self.notify(&event);
    }

    pub fn update(&self, session_id: &str, event: &Event, value: StateValue, status: SnapshotStatus) {
        {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            session.value = value.clone();
            session.status = status;
        }
        self.notify(&InspectionEvent::Snapshot {
            session_id: session_id.to_string(),
            event: event.clone(),
            value,
            status,
        });
    }

    pub fn unregister(&self, session_id: &str) -> Option<InspectedActor> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            self.notify(&InspectionEvent::Unregistered {
                session_id: session_id.to_string(),
            });
        }
        removed
    }

    pub fn get(&self, session_id: &str) -> Option<InspectedActor> {
        self.sessions.read().get(session_id).cloned()
    }

    pub fn sessions(&self) -> Vec<InspectedActor> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    // Listeners run without holding the session lock.
    fn notify(&self, event: &InspectionEvent) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }
}

impl fmt::Debug for InspectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InspectionRegistry")
            .field("sessions", &self.sessions.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn actor(session_id: &str) -> InspectedActor {
        InspectedActor {
            session_id: session_id.to_string(),
            machine_id: "m".to_string(),
            parent: None,
            started_at: Utc::now(),
            status: SnapshotStatus::Active,
            value: StateValue::from("idle"),
        }
    }

    #[test]
    fn registries_are_independent() {
        let first = InspectionRegistry::new();
        let second = InspectionRegistry::new();
        first.register(actor("a"));

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn lifecycle_is_reported_to_listeners() {
        let registry = InspectionRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.listen(move |event| sink.lock().push(event.clone()));

        registry.register(actor("s1"));
        registry.update("s1", &Event::new("GO"), StateValue::from("busy"), SnapshotStatus::Active);
        assert_eq!(registry.get("s1").unwrap().value, StateValue::from("busy"));
        assert!(registry.unregister("s1").is_some());
        assert!(registry.unregister("s1").is_none());

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], InspectionEvent::Registered { .. }));
        assert!(matches!(seen[1], InspectionEvent::Snapshot { .. }));
        assert!(matches!(seen[2], InspectionEvent::Unregistered { .. }));
    }

    #[test]
    fn updates_for_unknown_sessions_are_ignored() {
        let registry = InspectionRegistry::new();
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        registry.listen(move |_| *sink.lock() += 1);

        registry.update("ghost", &Event::new("GO"), StateValue::from("x"), SnapshotStatus::Active);
        assert_eq!(*count.lock(), 0);
    }
}
