//! End-to-end scenarios through the public API.

use harel::checkpoint::Checkpoint;
use harel::core::action::RAISE;
use harel::effects::{Actor, ActorError};
use harel::snapshot::PersistedSnapshot;
use harel::{EngineConfig, ImplementationRegistry, Machine, SnapshotStatus, StateValue, TransitionError};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stillwater::prelude::*;

fn abc() -> Machine {
    Machine::from_json(json!({
        "initial": "a",
        "states": {"a": {"on": {"NEXT": "b"}}, "b": {"on": {"NEXT": "c"}}, "c": {}}
    }))
    .unwrap()
}

#[test]
fn abc_fixture_steps_through_values() {
    let machine = abc();
    let (a, _) = machine.initial_transition(None).unwrap();
    assert_eq!(a.value(), StateValue::from("a"));
    let (b, _) = machine.transition(&a, "NEXT").unwrap();
    assert_eq!(b.value(), StateValue::from("b"));
    let (c, _) = machine.transition(&b, "NEXT").unwrap();
    assert_eq!(c.value(), StateValue::from("c"));
}

#[test]
fn abc_fixture_survives_serialization_between_steps() {
    let machine = abc();
    let (a, _) = machine.initial_transition(None).unwrap();
    let (direct_b, _) = machine.transition(&a, "NEXT").unwrap();

    let text = serde_json::to_string(&a).unwrap();
    let persisted = PersistedSnapshot::from_json(serde_json::from_str(&text).unwrap()).unwrap();
    let restored = machine.resolve_state(&persisted).unwrap();
    assert_eq!(restored, a);

    let (b, _) = machine.transition(&restored, "NEXT").unwrap();
    assert_eq!(b, direct_b);
    let (c, _) = machine.transition(&b, "NEXT").unwrap();
    assert!(c.matches("c"));
}

#[test]
fn round_trip_preserves_configuration_and_context() {
    let machine = Machine::from_json(json!({
        "context": {"user": {"name": "ada", "roles": ["admin"]}, "attempts": 2},
        "initial": "form",
        "states": {
            "form": {
                "type": "parallel",
                "states": {
                    "name": {"initial": "valid", "states": {"valid": {}, "invalid": {}}},
                    "email": {"initial": "invalid", "states": {"valid": {}, "invalid": {}}}
                }
            }
        }
    }))
    .unwrap();
    let (snapshot, _) = machine.initial_transition(None).unwrap();

    let json = snapshot.persisted().to_json().unwrap();
    let restored = machine.resolve_state_json(json).unwrap();
    assert_eq!(restored.configuration_ids(), snapshot.configuration_ids());
    assert_eq!(restored.context(), snapshot.context());
    assert_eq!(restored.value(), snapshot.value());
    assert!(restored.matches("form.name.valid"));
    assert!(restored.matches("form.email.invalid"));
}

#[tokio::test]
async fn computing_transitions_never_runs_actions() {
    let assigned = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&assigned);
    let machine = Machine::from_json(json!({
        "initial": "counting",
        "states": {"counting": {"entry": "increment", "on": {"AGAIN": {"target": "counting", "reenter": true}}}}
    }))
    .unwrap()
    .provide(ImplementationRegistry::new().assigner("unused", move |args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(args.context.clone())
    }));

    let executed = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&executed);
    let mut actor = Actor::new(machine.clone()).with_executor("increment", move |_| {
        let sink = Arc::clone(&sink);
        from_fn(move |_: &()| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ActorError>(())
        })
        .boxed()
    });

    let (snapshot, actions) = machine.initial_transition(None).unwrap();
    let (_, more) = machine.transition(&snapshot, "AGAIN").unwrap();
    let described = actions
        .iter()
        .chain(more.iter())
        .filter(|action| action.action_type == "increment")
        .count();
    assert_eq!(described, 2);
    assert_eq!(executed.load(Ordering::SeqCst), 0);

    actor.start(&()).await.unwrap();
    assert_eq!(executed.load(Ordering::SeqCst), 1);
    actor.send(&(), "AGAIN").await.unwrap();
    assert_eq!(executed.load(Ordering::SeqCst), 2);

    // only implementations the definition references are ever invoked
    assert_eq!(assigned.load(Ordering::SeqCst), 0);
}

#[test]
fn child_transition_beats_parent_transition() {
    let machine = Machine::from_json(json!({
        "initial": "parent",
        "states": {
            "parent": {
                "initial": "child",
                "states": {"child": {"on": {"E": "#machine.fromChild"}}},
                "on": {"E": "fromParent"}
            },
            "fromChild": {},
            "fromParent": {}
        }
    }))
    .unwrap();

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let (snapshot, _) = machine.transition(&snapshot, "E").unwrap();
    assert!(snapshot.matches("fromChild"));
}

#[test]
fn first_passing_guard_wins_and_later_guards_are_not_evaluated() {
    let later = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&later);
    let machine = Machine::from_json(json!({
        "initial": "start",
        "states": {
            "start": {
                "on": {
                    "E": [
                        {"target": "rejected", "guard": "no"},
                        {"target": "accepted", "guard": "yes"},
                        {"target": "shadowed", "guard": "counted"}
                    ]
                }
            },
            "rejected": {},
            "accepted": {},
            "shadowed": {}
        }
    }))
    .unwrap()
    .provide(
        ImplementationRegistry::new()
            .guard("no", |_| Ok(false))
            .guard("yes", |_| Ok(true))
            .guard("counted", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }),
    );

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let (snapshot, _) = machine.transition(&snapshot, "E").unwrap();
    assert!(snapshot.matches("accepted"));
    assert_eq!(later.load(Ordering::SeqCst), 0);
}

fn media() -> Machine {
    Machine::from_json(json!({
        "id": "media",
        "initial": "player",
        "states": {
            "player": {
                "initial": "stopped",
                "states": {
                    "stopped": {"on": {"PLAY": "playing"}},
                    "playing": {
                        "initial": "normal",
                        "states": {"normal": {"on": {"FAST": "fast"}}, "fast": {}}
                    },
                    "shallow": {"type": "history"},
                    "deep": {"type": "history", "history": "deep"}
                },
                "on": {"POWER_OFF": "off"}
            },
            "off": {
                "on": {
                    "RESUME_SHALLOW": "#media.player.shallow",
                    "RESUME_DEEP": "#media.player.deep",
                    "RESTART": "player"
                }
            }
        }
    }))
    .unwrap()
}

fn powered_off_while_fast(machine: &Machine) -> harel::Snapshot {
    let (mut snapshot, _) = machine.initial_transition(None).unwrap();
    for event in ["PLAY", "FAST", "POWER_OFF"] {
        snapshot = machine.transition(&snapshot, event).unwrap().0;
    }
    assert!(snapshot.matches("off"));
    snapshot
}

#[test]
fn deep_history_restores_the_exact_leaf() {
    let machine = media();
    let off = powered_off_while_fast(&machine);
    let (resumed, _) = machine.transition(&off, "RESUME_DEEP").unwrap();
    assert!(resumed.matches("player.playing.fast"));
}

#[test]
fn shallow_history_restores_the_child_with_its_default() {
    let machine = media();
    let off = powered_off_while_fast(&machine);
    let (resumed, _) = machine.transition(&off, "RESUME_SHALLOW").unwrap();
    assert!(resumed.matches("player.playing.normal"));
}

#[test]
fn history_survives_persistence() {
    let machine = media();
    let off = powered_off_while_fast(&machine);
    let restored = machine.resolve_state(&off.persisted()).unwrap();
    let (resumed, _) = machine.transition(&restored, "RESUME_DEEP").unwrap();
    assert!(resumed.matches("player.playing.fast"));
}

#[test]
fn entering_without_history_uses_the_initial_state() {
    let machine = media();
    let off = powered_off_while_fast(&machine);
    let (restarted, _) = machine.transition(&off, "RESTART").unwrap();
    assert!(restarted.matches("player.stopped"));
}

#[test]
fn eventless_chain_settles_in_one_macrostep() {
    let machine = Machine::from_json(json!({
        "initial": "idle",
        "states": {
            "idle": {"on": {"GO": "a"}},
            "a": {"always": "b"},
            "b": {"always": "c"},
            "c": {"always": {"target": "a", "guard": "never"}}
        }
    }))
    .unwrap()
    .provide(ImplementationRegistry::new().guard("never", |_| Ok(false)));

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let result = machine.macrostep(&snapshot, "GO").unwrap();
    assert!(result.snapshot.matches("c"));
    assert_eq!(result.microsteps.len(), 3);
}

#[test]
fn eventless_cycles_are_bounded() {
    let machine = Machine::from_json(json!({
        "initial": "idle",
        "states": {
            "idle": {"on": {"GO": "ping"}},
            "ping": {"always": "pong"},
            "pong": {"always": "ping"}
        }
    }))
    .unwrap()
    .with_config(EngineConfig::default().with_max_microsteps(50));

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let result = machine.transition(&snapshot, "GO");
    assert_eq!(result.unwrap_err(), TransitionError::NonterminatingEventlessCycle { limit: 50 });
}

#[test]
fn parallel_regions_transition_together() {
    let machine = Machine::from_json(json!({
        "initial": "p",
        "states": {
            "p": {
                "type": "parallel",
                "states": {
                    "left": {"initial": "a", "states": {"a": {"on": {"E": "b"}}, "b": {}}},
                    "right": {"initial": "c", "states": {"c": {"on": {"E": "d"}}, "d": {}}}
                },
                "on": {"E": "elsewhere"}
            },
            "elsewhere": {}
        }
    }))
    .unwrap();

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let (snapshot, _) = machine.transition(&snapshot, "E").unwrap();
    assert!(snapshot.matches("p.left.b"));
    assert!(snapshot.matches("p.right.d"));
}

#[test]
fn wildcards_prefer_the_most_specific_descriptor() {
    let machine = Machine::from_json(json!({
        "initial": "s",
        "states": {
            "s": {
                "on": {
                    "*": "anything",
                    "mouse.*": "mouse",
                    "mouse.click": "click"
                }
            },
            "anything": {},
            "mouse": {},
            "click": {}
        }
    }))
    .unwrap();

    let (s, _) = machine.initial_transition(None).unwrap();
    let target = |event: &str| machine.transition(&s, event).unwrap().0.value();
    assert_eq!(target("mouse.click"), StateValue::from("click"));
    assert_eq!(target("mouse.move"), StateValue::from("mouse"));
    assert_eq!(target("key.down"), StateValue::from("anything"));
}

#[test]
fn final_states_raise_done_events_and_complete_the_machine() {
    let machine = Machine::from_json(json!({
        "initial": "job",
        "states": {
            "job": {
                "initial": "working",
                "states": {
                    "working": {"on": {"FINISH": "complete"}},
                    "complete": {"type": "final", "output": {"ok": true}}
                },
                "onDone": "reported"
            },
            "reported": {"on": {"CLOSE": "closed"}},
            "closed": {"type": "final", "output": {"closed": true}}
        }
    }))
    .unwrap();

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let result = machine.macrostep(&snapshot, "FINISH").unwrap();
    assert!(result.snapshot.matches("reported"));
    let done = &result.microsteps[1].event;
    assert_eq!(done.event_type, "xstate.done.state.machine.job");
    assert_eq!(done.get("output"), Some(&json!({"ok": true})));

    let (closed, _) = machine.transition(&result.snapshot, "CLOSE").unwrap();
    assert_eq!(closed.status(), SnapshotStatus::Done);
    assert_eq!(closed.output(), Some(&json!({"closed": true})));
}

#[test]
fn parallel_state_is_done_when_every_region_is() {
    let machine = Machine::from_json(json!({
        "initial": "upload",
        "states": {
            "upload": {
                "type": "parallel",
                "states": {
                    "files": {"initial": "sending", "states": {"sending": {"on": {"FILES_SENT": "sent"}}, "sent": {"type": "final"}}},
                    "meta": {"initial": "sending", "states": {"sending": {"on": {"META_SENT": "sent"}}, "sent": {"type": "final"}}}
                },
                "onDone": "finished"
            },
            "finished": {}
        }
    }))
    .unwrap();

    let (snapshot, _) = machine.initial_transition(None).unwrap();
    let (snapshot, _) = machine.transition(&snapshot, "FILES_SENT").unwrap();
    assert!(snapshot.matches("upload"));
    let (snapshot, _) = machine.transition(&snapshot, "META_SENT").unwrap();
    assert!(snapshot.matches("finished"));
}

#[test]
fn delayed_transitions_emit_raise_descriptors() {
    let machine = Machine::from_json(json!({
        "initial": "waiting",
        "states": {"waiting": {"after": {"250": "timedOut"}}, "timedOut": {}}
    }))
    .unwrap();

    let (_, actions) = machine.initial_transition(None).unwrap();
    let raise = actions.iter().find(|action| action.action_type == RAISE).unwrap();
    assert_eq!(raise.delay(), Some(250));
    assert_eq!(raise.event().unwrap().event_type, raise.send_id().unwrap());
}

#[tokio::test]
async fn actor_delivers_delayed_transitions() {
    let machine = Machine::from_json(json!({
        "initial": "waiting",
        "states": {"waiting": {"after": {"250": "timedOut"}}, "timedOut": {"entry": "alert"}}
    }))
    .unwrap();
    let alerts = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&alerts);
    let mut actor = Actor::new(machine).with_executor("alert", move |_| {
        let sink = Arc::clone(&sink);
        from_fn(move |_: &()| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ActorError>(())
        })
        .boxed()
    });

    actor.start(&()).await.unwrap();
    actor.advance_time(&(), 249).await.unwrap();
    assert_eq!(alerts.load(Ordering::SeqCst), 0);

    actor.advance_time(&(), 1).await.unwrap();
    assert!(actor.snapshot().unwrap().matches("timedOut"));
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn actor_journal_replays_to_the_same_snapshot() {
    let machine = abc();
    let mut actor: Actor<()> = Actor::new(machine.clone());
    actor.start(&()).await.unwrap();
    actor.send(&(), "NEXT").await.unwrap();
    actor.send(&(), "NEXT").await.unwrap();

    let replayed = actor.journal().replay(&machine).unwrap().unwrap();
    assert_eq!(&replayed, actor.snapshot().unwrap());
    assert_eq!(actor.journal().len(), 3);
}

#[test]
fn checkpoints_restore_across_machine_instances() {
    let machine = media();
    let off = powered_off_while_fast(&machine);
    let bytes = Checkpoint::new(&off).to_binary().unwrap();

    let rebuilt = media();
    let restored = Checkpoint::from_binary(&bytes).unwrap().restore(&rebuilt).unwrap();
    let (resumed, _) = rebuilt.transition(&restored, "RESUME_DEEP").unwrap();
    assert!(resumed.matches("player.playing.fast"));
}
