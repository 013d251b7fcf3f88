//! Shared fixtures for integration tests.

#![allow(dead_code, unused_imports)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use unistore::effect::Event;
use unistore::{Action, Effect, Reducer, Sink, Store};

// -- Counter ------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counter {
    pub count: i64,
    pub log: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CounterAction {
    Increment,
    Decrement,
    Set(i64),
    /// Emits `Increment` `n` times through synchronous effects.
    Repeat(u32),
}

impl Action for CounterAction {}

pub fn counter_reducer() -> Reducer<Counter, CounterAction> {
    Reducer::new(|counter: &mut Counter, action: CounterAction, _| {
        counter.log.push(action.label());
        match action {
            CounterAction::Increment => counter.count += 1,
            CounterAction::Decrement => counter.count -= 1,
            CounterAction::Set(value) => counter.count = value,
            CounterAction::Repeat(n) => {
                return Effect::from_iter((0..n).map(|_| CounterAction::Increment));
            }
        }
        Effect::none()
    })
}

pub fn counter_store() -> Store<Counter, CounterAction> {
    Store::new(Counter::default(), counter_reducer(), ())
}

// -- Recording ----------------------------------------------------------------

/// Collects values handed to observers or sinks.
#[derive(Clone)]
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn observer(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let values = Arc::clone(&self.values);
        move |value: &T| values.lock().push(value.clone())
    }

    pub fn push(&self, value: T) {
        self.values.lock().push(value);
    }

    pub fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }
}

/// A sink recording emitted values and whether the effect completed.
pub fn recording_sink<A: Clone + Send + 'static>() -> (Sink<A>, Recorder<A>, Arc<AtomicBool>) {
    let recorder = Recorder::new();
    let completed = Arc::new(AtomicBool::new(false));
    let sink = {
        let recorder = recorder.clone();
        let completed = Arc::clone(&completed);
        Sink::new(move |event| match event {
            Event::Next(value) => recorder.push(value),
            Event::Completed => completed.store(true, Ordering::SeqCst),
        })
    };
    (sink, recorder, completed)
}

// -- Async helpers ------------------------------------------------------------

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}
