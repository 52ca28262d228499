mod common;

use common::{obj, record_events};
use parking_lot::Mutex;
use proptest::prelude::*;
use serde_json::{json, Value};
use statesync::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn created_without_options_has_empty_state() {
    let stateful = StateHolder::new();
    assert_eq!(Value::Object(stateful.state()), json!({}));
}

#[test]
fn two_updates_fire_two_events() {
    let stateful = StateHolder::new();
    let events = record_events(&stateful);

    stateful.set_state(PartialState::new().set("a", 1));
    stateful.set_state(PartialState::new().set("b", 2));

    assert_eq!(Value::Object(stateful.state()), json!({"a": 1, "b": 2}));
    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(Value::Object(events[0].state().clone()), json!({"a": 1}));
    assert_eq!(Value::Object(events[1].state().clone()), json!({"a": 1, "b": 2}));
}

#[test]
fn clearing_the_only_key_leaves_empty_state() {
    let stateful = StateHolder::new();
    stateful.set_state(PartialState::new().set("a", 1));
    stateful.set_state(PartialState::new().clear("a"));
    assert_eq!(Value::Object(stateful.state()), json!({}));
}

#[test]
fn whole_states_merge_as_partials() {
    let stateful = StateHolder::new();
    stateful.set_state(obj(json!({"a": {"x": 1}})));
    stateful.set_state(obj(json!({"a": {"y": 2}})));
    assert_eq!(Value::Object(stateful.state()), json!({"a": {"x": 1, "y": 2}}));
}

#[test]
fn emitted_event_serializes_with_type_tag() {
    let stateful = StateHolder::new();
    let events = record_events(&stateful);
    stateful.set_state(PartialState::new().set("a", 1));

    let event = events.lock()[0].clone();
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        json!({
            "type": "state:changed",
            "state": {"a": 1},
            "target": stateful.instance_id().to_string(),
        })
    );
}

#[test]
fn concurrent_updates_emit_in_storage_order() {
    for _ in 0..200 {
        let holder = Arc::new(StateHolder::new());
        let last = Arc::new(Mutex::new(None::<State>));
        let mismatches = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&holder);
        let sink = Arc::clone(&last);
        let counter = Arc::clone(&mismatches);
        holder.on(move |event: &StateEvent| {
            if let Some(holder) = weak.upgrade() {
                if event.state() != &holder.state() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
            *sink.lock() = Some(event.state().clone());
        });

        std::thread::scope(|scope| {
            for writer in 0..4 {
                let holder = &holder;
                scope.spawn(move || {
                    for n in 0..20 {
                        holder.set_state(PartialState::new().set("writer", writer).set("n", n));
                    }
                });
            }
        });

        assert_eq!(mismatches.load(Ordering::SeqCst), 0);
        assert_eq!(last.lock().clone(), Some(holder.state()));
    }
}

fn partials() -> impl Strategy<Value = Vec<PartialState>> {
    let update = prop::option::of(prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,3}".prop_map(Value::from),
        Just(json!({"nested": true})),
    ]);
    let partial = prop::collection::btree_map("[a-d]", update, 0..4)
        .prop_map(|m| m.into_iter().collect::<PartialState>());
    prop::collection::vec(partial, 0..8)
}

proptest! {
    #[test]
    fn one_event_per_update_carrying_the_stored_state(updates in partials()) {
        let stateful = StateHolder::new();
        let events = record_events(&stateful);

        for partial in &updates {
            stateful.set_state(partial.clone());
            let last = events.lock().last().cloned();
            prop_assert!(last.is_some());
            let last = last.unwrap();
            let current = stateful.state();
            prop_assert_eq!(last.state(), &current);
        }

        prop_assert_eq!(events.lock().len(), updates.len());
    }
}
