//! Actor: the effectful shell around a machine.
//!
//! The actor owns the current snapshot, feeds events from its mailbox
//! through the pure engine one at a time, commits each resulting snapshot
//! and then executes the returned action descriptors.

use crate::core::action::{ASSIGN, CANCEL, EMIT, LOG, RAISE, SEND_TO, SPAWN_CHILD, STOP_CHILD};
use crate::core::event::{
    descriptor_matches, done_actor_event, error_actor_event, init_event, stop_event,
};
use crate::core::{ActionDescriptor, Event};
use crate::effects::error::ActorError;
use crate::effects::inspect::{InspectedActor, InspectionRegistry};
use crate::effects::journal::{JournalEntry, SnapshotJournal};
use crate::effects::logic::ActorLogic;
use crate::effects::scheduler::{Recipient, Scheduler};
use crate::engine::MacrostepResult;
use crate::machine::Machine;
use crate::snapshot::{Snapshot, SnapshotStatus};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use stillwater::effect::{BoxedEffect, Effect};

/// Factory producing a fresh effect for each executed descriptor.
pub type ActionExecutor<Env> =
    Arc<dyn Fn(&ActionDescriptor) -> BoxedEffect<(), ActorError, Env> + Send + Sync>;

/// Called with every committed snapshot.
pub type Subscriber = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Called with events published by `xstate.emit`.
pub type EmitListener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Committed snapshots an actor journals before dropping the oldest.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    NotStarted,
    Running,
    Stopped,
}

/// A running machine instance.
pub struct Actor<Env: Clone + Send + Sync + 'static> {
    id: String,
    session_id: String,
    parent_session: Option<String>,
    machine: Machine,
    input: Option<Value>,
    restored: Option<Snapshot>,
    snapshot: Option<Snapshot>,
    lifecycle: Lifecycle,
    failure: Option<ActorError>,
    executors: BTreeMap<String, ActionExecutor<Env>>,
    logic: ActorLogic,
    children: BTreeMap<String, Actor<Env>>,
    scheduler: Scheduler,
    mailbox: VecDeque<Event>,
    outbox: Vec<Event>,
    subscribers: Vec<Subscriber>,
    listeners: Vec<(String, EmitListener)>,
    journal: SnapshotJournal,
    inspection: Option<Arc<InspectionRegistry>>,
}

impl<Env: Clone + Send + Sync + 'static> Actor<Env> {
    pub fn new(machine: Machine) -> Self {
        Self {
            id: machine.id().to_string(),
            session_id: uuid::Uuid::new_v4().to_string(),
            parent_session: None,
            machine,
            input: None,
            restored: None,
            snapshot: None,
            lifecycle: Lifecycle::NotStarted,
            failure: None,
            executors: BTreeMap::new(),
            logic: ActorLogic::new(),
            children: BTreeMap::new(),
            scheduler: Scheduler::new(),
            mailbox: VecDeque::new(),
            outbox: Vec::new(),
            subscribers: Vec::new(),
            listeners: Vec::new(),
            journal: SnapshotJournal::with_capacity(DEFAULT_JOURNAL_CAPACITY),
            inspection: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    /// Resume from a previously committed snapshot instead of the initial
    /// state. Entry actions are not re-run.
    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.restored = Some(snapshot);
        self
    }

    /// Register the executor for descriptors of `action_type`.
    pub fn with_executor<F>(mut self, action_type: impl Into<String>, executor: F) -> Self
    where
        F: Fn(&ActionDescriptor) -> BoxedEffect<(), ActorError, Env> + Send + Sync + 'static,
    {
        self.executors.insert(action_type.into(), Arc::new(executor));
        self
    }

    /// Bound the journal to the latest `capacity` commits; `0` disables it.
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal = SnapshotJournal::with_capacity(capacity);
        self
    }

    pub fn with_logic(mut self, logic: ActorLogic) -> Self {
        self.logic = logic;
        self
    }

    pub fn with_inspection(mut self, registry: Arc<InspectionRegistry>) -> Self {
        self.inspection = Some(registry);
        self
    }

    pub fn subscribe<F>(&mut self, subscriber: F)
    where
        F: Fn(&Snapshot) + Send + Sync + 'static,
    {
        self.subscribers.push(Arc::new(subscriber));
    }

    /// Listen for emitted events matching `descriptor` (wildcards allowed).
    pub fn on_emit<F>(&mut self, descriptor: impl Into<String>, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.listeners.push((descriptor.into(), Arc::new(listener)));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Last committed snapshot.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The error that stopped this actor, if any.
    pub fn failure(&self) -> Option<&ActorError> {
        self.failure.as_ref()
    }

    pub fn journal(&self) -> &SnapshotJournal {
        &self.journal
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn child(&self, id: &str) -> Option<&Actor<Env>> {
        self.children.get(id)
    }

    pub fn child_ids(&self) -> impl Iterator<Item = &str> {
        self.children.keys().map(String::as_str)
    }

    /// Events this actor sent to `_parent` that nobody has collected.
    pub fn take_outbox(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    /// Compute the initial snapshot, execute its actions and process
    /// whatever they queued.
    pub async fn start(&mut self, env: &Env) -> Result<(), ActorError> {
        self.launch(env).await
    }

    /// Queue `event` and process the mailbox until it is empty.
    pub async fn send(&mut self, env: &Env, event: impl Into<Event>) -> Result<(), ActorError> {
        if self.lifecycle != Lifecycle::Running {
            return Err(ActorError::NotRunning { id: self.id.clone() });
        }
        self.mailbox.push_back(event.into());
        self.drain(env).await
    }

    /// Move the logical clock forward by `ms`, delivering every delayed
    /// event that falls due, children included.
    pub async fn advance_time(&mut self, env: &Env, ms: u64) -> Result<(), ActorError> {
        self.advance(env, ms).await
    }

    /// Stop this actor and its children. Pending delayed events are
    /// dropped and no further events are processed.
    pub fn stop(&mut self) {
        match self.lifecycle {
            Lifecycle::Stopped => return,
            Lifecycle::NotStarted => {
                self.lifecycle = Lifecycle::Stopped;
                return;
            }
            Lifecycle::Running => {}
        }
        if let Some(current) = self.snapshot.as_ref() {
            match self.machine.transition(current, stop_event()) {
                Ok((stopped, _)) => self.snapshot = Some(stopped),
                Err(error) => tracing::warn!(actor = %self.id, error = %error, "stop transition failed"),
            }
        }
        self.notify();
        self.halt();
    }

    fn launch<'a>(&'a mut self, env: &'a Env) -> LocalBoxFuture<'a, Result<(), ActorError>> {
        Box::pin(async move {
            if self.lifecycle != Lifecycle::NotStarted {
                return Err(ActorError::AlreadyStarted { id: self.id.clone() });
            }

            let event = init_event(self.input.clone());
            let result = match self.restored.take() {
                Some(snapshot) => MacrostepResult {
                    snapshot,
                    actions: Vec::new(),
                    microsteps: Vec::new(),
                },
                None => self.machine.initial_macrostep(self.input.clone())?,
            };

            self.lifecycle = Lifecycle::Running;
            tracing::info!(actor = %self.id, session = %self.session_id, "actor started");
            if let Some(registry) = &self.inspection {
                registry.register(InspectedActor {
                    session_id: self.session_id.clone(),
                    machine_id: self.machine.id().to_string(),
                    parent: self.parent_session.clone(),
                    started_at: Utc::now(),
                    status: result.snapshot.status(),
                    value: result.snapshot.value(),
                });
            }

            self.commit(env, event, result).await?;
            self.drain(env).await
        })
    }

    fn drain<'a>(&'a mut self, env: &'a Env) -> LocalBoxFuture<'a, Result<(), ActorError>> {
        Box::pin(async move {
            while self.lifecycle == Lifecycle::Running {
                let Some(event) = self.mailbox.pop_front() else {
                    break;
                };
                self.step(env, event).await?;
            }
            Ok(())
        })
    }

    fn advance<'a>(&'a mut self, env: &'a Env, ms: u64) -> LocalBoxFuture<'a, Result<(), ActorError>> {
        Box::pin(async move {
            let until = self.scheduler.now().saturating_add(ms);
            while self.lifecycle == Lifecycle::Running {
                let Some(scheduled) = self.scheduler.next_due(until) else {
                    break;
                };
                tracing::debug!(
                    actor = %self.id,
                    event = %scheduled.event.event_type,
                    due = scheduled.due,
                    "delivering delayed event"
                );
                self.deliver(env, scheduled.recipient, scheduled.event).await;
                self.drain(env).await?;
            }
            self.scheduler.advance_to(until);

            let ids: Vec<String> = self.children.keys().cloned().collect();
            for id in ids {
                if let Some(child) = self.children.get_mut(&id) {
                    if let Err(error) = child.advance(env, ms).await {
                        tracing::debug!(actor = %self.id, child = %id, error = %error, "child failed");
                    }
                }
                self.collect_child(&id);
            }
            self.drain(env).await
        })
    }

    async fn step(&mut self, env: &Env, event: Event) -> Result<(), ActorError> {
        let Some(current) = self.snapshot.as_ref() else {
            return Ok(());
        };
        tracing::debug!(actor = %self.id, event = %event.event_type, "processing event");
        match self.machine.macrostep(current, event.clone()) {
            Ok(result) => self.commit(env, event, result).await,
            Err(error) => Err(self.fail(error.into())),
        }
    }

    async fn commit(&mut self, env: &Env, event: Event, result: MacrostepResult) -> Result<(), ActorError> {
        let MacrostepResult { snapshot, actions, .. } = result;
        self.journal.push(JournalEntry {
            event: event.clone(),
            snapshot: snapshot.persisted(),
            timestamp: Utc::now(),
        });
        if let Some(registry) = &self.inspection {
            registry.update(&self.session_id, &event, snapshot.value(), snapshot.status());
        }
        let status = snapshot.status();
        self.snapshot = Some(snapshot);

        for action in &actions {
            if let Err(error) = self.execute(env, action).await {
                return Err(self.fail(error));
            }
        }
        self.notify();

        if status != SnapshotStatus::Active {
            self.halt();
        }
        Ok(())
    }

    async fn execute(&mut self, env: &Env, action: &ActionDescriptor) -> Result<(), ActorError> {
        match action.action_type.as_str() {
            ASSIGN => {}
            RAISE => {
                if let Some(event) = action.event() {
                    let id = action.send_id().map(str::to_string);
                    self.scheduler
                        .schedule(action.delay().unwrap_or(0), Recipient::Own, event, id);
                }
            }
            SEND_TO => {
                let to = action.params.get("to").and_then(Value::as_str);
                if let (Some(to), Some(event)) = (to, action.event()) {
                    let recipient = Recipient::from_target(to);
                    match action.delay() {
                        Some(delay) => {
                            let id = action.send_id().map(str::to_string);
                            self.scheduler.schedule(delay, recipient, event, id);
                        }
                        None => self.deliver(env, recipient, event).await,
                    }
                }
            }
            CANCEL => {
                if let Some(id) = action.send_id() {
                    self.scheduler.cancel(id);
                }
            }
            LOG => {
                let value = action.params.get("value").unwrap_or(&Value::Null);
                match action.params.get("label").and_then(Value::as_str) {
                    Some(label) => tracing::info!(actor = %self.id, label, %value, "log"),
                    None => tracing::info!(actor = %self.id, %value, "log"),
                }
            }
            EMIT => {
                if let Some(event) = action.event() {
                    self.emit(&event);
                }
            }
            SPAWN_CHILD => self.spawn(env, &action.params).await?,
            STOP_CHILD => {
                if let Some(mut child) = action.send_id().and_then(|id| self.children.remove(id)) {
                    child.stop();
                }
            }
            custom => match self.executors.get(custom).cloned() {
                Some(executor) => executor(action).run(env).await?,
                None => tracing::debug!(actor = %self.id, action = custom, "no executor registered"),
            },
        }
        Ok(())
    }

    async fn deliver(&mut self, env: &Env, recipient: Recipient, event: Event) {
        match recipient {
            Recipient::Own => self.mailbox.push_back(event),
            Recipient::Parent => self.outbox.push(event),
            Recipient::Child(id) => {
                let Some(child) = self.children.get_mut(&id) else {
                    tracing::warn!(actor = %self.id, child = %id, event = %event.event_type, "dropping event for unknown child");
                    return;
                };
                if let Err(error) = child.send(env, event).await {
                    tracing::debug!(actor = %self.id, child = %id, error = %error, "child failed");
                }
                self.collect_child(&id);
            }
        }
    }

    async fn spawn(&mut self, env: &Env, params: &Value) -> Result<(), ActorError> {
        let src = params.get("src").and_then(Value::as_str).unwrap_or_default();
        let id = params
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(src)
            .to_string();
        let machine = self
            .logic
            .get(src)
            .cloned()
            .ok_or_else(|| ActorError::MissingLogic { src: src.to_string() })?;

        let mut child = Actor::new(machine).with_id(id.clone());
        child.input = params.get("input").cloned();
        child.parent_session = Some(self.session_id.clone());
        child.executors = self.executors.clone();
        child.logic = self.logic.clone();
        child.inspection = self.inspection.clone();

        if let Err(error) = child.launch(env).await {
            if child.lifecycle == Lifecycle::NotStarted {
                tracing::warn!(actor = %self.id, child = %id, error = %error, "child failed to start");
                self.mailbox.push_back(error_actor_event(&id, error.to_string()));
                return Ok(());
            }
        }
        self.children.insert(id.clone(), child);
        self.collect_child(&id);
        Ok(())
    }

    /// Forward what a child sent to `_parent` and turn its completion or
    /// failure into events for this actor.
    fn collect_child(&mut self, id: &str) {
        let Some(child) = self.children.get_mut(id) else {
            return;
        };
        self.mailbox.extend(child.outbox.drain(..));

        let outcome = child
            .snapshot
            .as_ref()
            .map(|snapshot| (snapshot.status(), snapshot.output().cloned(), snapshot.error().cloned()));
        match outcome {
            Some((SnapshotStatus::Done, output, _)) => {
                self.children.remove(id);
                self.mailbox.push_back(done_actor_event(id, output));
            }
            Some((SnapshotStatus::Error, _, error)) => {
                self.children.remove(id);
                let message = match error {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => "actor failed".to_string(),
                };
                self.mailbox.push_back(error_actor_event(id, message));
            }
            _ => {}
        }
    }

    fn emit(&self, event: &Event) {
        for (descriptor, listener) in &self.listeners {
            if descriptor_matches(descriptor, &event.event_type) {
                listener(event);
            }
        }
    }

    fn notify(&self) {
        if let Some(snapshot) = &self.snapshot {
            for subscriber in &self.subscribers {
                subscriber(snapshot);
            }
        }
    }

    /// Mark the actor failed, keeping the last committed configuration.
    fn fail(&mut self, error: ActorError) -> ActorError {
        tracing::warn!(actor = %self.id, error = %error, "actor failed");
        if let Some(snapshot) = self.snapshot.as_mut() {
            snapshot.status = SnapshotStatus::Error;
            snapshot.error = Some(Value::String(error.to_string()));
        }
        self.failure = Some(error.clone());
        self.notify();
        self.halt();
        error
    }

    fn halt(&mut self) {
        for (_, mut child) in std::mem::take(&mut self.children) {
            child.stop();
        }
        self.scheduler.clear();
        self.mailbox.clear();
        self.lifecycle = Lifecycle::Stopped;
        if let Some(registry) = &self.inspection {
            registry.unregister(&self.session_id);
        }
        tracing::info!(actor = %self.id, session = %self.session_id, "actor stopped");
    }
}

impl<Env: Clone + Send + Sync + 'static> fmt::Debug for Actor<Env> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("lifecycle", &self.lifecycle)
            .field("snapshot", &self.snapshot)
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .field("pending", &self.scheduler.len())
            .finish()
    }
}
