mod common;

use common::{counter_store, Counter, CounterAction, Recorder};
use unistore::ViewStore;

#[test]
fn scoped_view_only_notifies_when_the_projection_changes() {
    let store = counter_store();
    let parity = store.scope_state(|counter: &Counter| counter.count % 2 == 0);
    let view = ViewStore::deduplicated(&parity);
    let seen = Recorder::<bool>::new();
    let _observer = view.observe(seen.observer());

    store.send(CounterAction::Increment);
    store.send(CounterAction::Repeat(2));
    store.send(CounterAction::Set(7));
    store.send(CounterAction::Set(8));
    assert_eq!(seen.values(), vec![false, true]);
    assert!(view.state());
}

#[test]
fn local_actions_through_a_scoped_view() {
    #[derive(Debug, Clone, PartialEq)]
    enum Stepper {
        Up,
        Down,
    }
    impl unistore::Action for Stepper {}

    let store = counter_store();
    let stepper = store.scope(
        |counter: &Counter| counter.count,
        |step: Stepper| match step {
            Stepper::Up => CounterAction::Increment,
            Stepper::Down => CounterAction::Decrement,
        },
    );
    let view = ViewStore::deduplicated(&stepper);
    let seen = Recorder::<i64>::new();
    let _observer = view.observe(seen.observer());

    view.send(Stepper::Up);
    view.send(Stepper::Up);
    view.send(Stepper::Down);
    assert_eq!(seen.values(), vec![1, 2, 1]);
    assert_eq!(store.state().count, 1);
    assert_eq!(store.state().log, vec!["Increment", "Increment", "Decrement"]);
}

#[test]
fn binding_reads_and_writes_the_count() {
    let store = counter_store();
    let view = ViewStore::new(&store, |a: &Counter, b: &Counter| a.count == b.count);
    let count = view.binding(|counter: &Counter| counter.count, CounterAction::Set);

    count.set(41);
    assert_eq!(count.get(), 41);
    store.send(CounterAction::Increment);
    assert_eq!(count.get(), 42);
}

#[test]
fn dropping_the_observer_stops_notifications() {
    let store = counter_store();
    let view = ViewStore::deduplicated(&store);
    let seen = Recorder::<Counter>::new();
    let observer = view.observe(seen.observer());

    store.send(CounterAction::Increment);
    drop(observer);
    store.send(CounterAction::Increment);
    assert_eq!(seen.len(), 1);
    assert_eq!(view.state().count, 2);
}
