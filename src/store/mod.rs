//! The store: owner of application state.
//!
//! ```text
//! send(action) ──→ queue ──→ drain loop ──→ reducer ──→ Effect
//!                    ↑                                    │
//!                    └───────── emitted actions ──────────┘
//!                                 │
//!                  queue empty ──→ broadcast(state) ──→ observers
//! ```
//!
//! Actions are processed one at a time in FIFO order. A `send` that arrives
//! while the store is draining (from an effect that emits synchronously, or
//! from another thread) is only queued; the running drain picks it up. State
//! is broadcast once per outermost `send`, after the queue is empty.
//!
//! Stores belong to the thread that created them. With thread checks on,
//! sends and effect completions from other threads are reported as
//! [`Diagnostic::ThreadViolation`](crate::diagnostics::Diagnostic::ThreadViolation).
//! Effects that finish on worker threads should hop back with
//! [`Effect::receive_on`]. Strict failures held from other threads are raised
//! by the next `send` on the owner thread.

mod observers;
mod scope;
mod view_store;

pub use observers::Subscription;
pub use view_store::{Binding, ViewStore};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::diagnostics::{Diagnostics, ThreadCheck};
use crate::effect::{CompositeDisposable, DisposeKey, Effect, Event, Sink};
use crate::reducer::{Action, Reducer, State};
use observers::Observers;

type ReduceFn<S, A> = Box<dyn Fn(&mut S, A) -> Effect<A> + Send + Sync>;

/// Runtime options for a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Report calls made off the owner thread.
    pub thread_checks: bool,
    /// Where the store's reducers and effects report problems.
    pub diagnostics: Diagnostics,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            thread_checks: true,
            diagnostics: Diagnostics::process_default(),
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thread_checks: config.store.thread_checks,
            diagnostics: Diagnostics::from_config(&config.diagnostics),
        }
    }
}

/// Serialized owner of a state value.
///
/// Cloning a store yields another handle to the same state. Effects still
/// running when the last handle is dropped are cancelled.
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<S, A> {
    state: RwLock<S>,
    queue: Mutex<Queue<A>>,
    reducer: ReduceFn<S, A>,
    effects: CompositeDisposable,
    observers: Observers<S>,
    thread_check: ThreadCheck,
    diagnostics: Diagnostics,
    /// Subscription to the parent store, for scoped stores.
    parent: Mutex<Option<Subscription>>,
    broadcasts: AtomicU64,
}

struct Queue<A> {
    actions: VecDeque<A>,
    sending: bool,
}

impl<S, A> Drop for StoreInner<S, A> {
    fn drop(&mut self) {
        if !self.effects.is_empty() {
            tracing::debug!(effects = self.effects.len(), "store dropped, cancelling effects");
        }
        self.effects.dispose();
    }
}

/// Completion bookkeeping for one running effect.
struct EffectSlot {
    completed: AtomicBool,
    key: Mutex<Option<DisposeKey>>,
}

impl<S: State, A: Action> Store<S, A> {
    /// A store owned by the calling thread.
    pub fn new<E: Send + Sync + 'static>(
        initial: S,
        reducer: Reducer<S, A, E>,
        environment: E,
    ) -> Self {
        Self::with_options(initial, reducer, environment, StoreOptions::default())
    }

    /// A store without owner-thread checks.
    pub fn unchecked<E: Send + Sync + 'static>(
        initial: S,
        reducer: Reducer<S, A, E>,
        environment: E,
    ) -> Self {
        let options = StoreOptions {
            thread_checks: false,
            ..StoreOptions::default()
        };
        Self::with_options(initial, reducer, environment, options)
    }

    pub fn with_options<E: Send + Sync + 'static>(
        initial: S,
        reducer: Reducer<S, A, E>,
        environment: E,
        options: StoreOptions,
    ) -> Self {
        Self::from_parts(
            initial,
            Box::new(move |state: &mut S, action: A| reducer.run(state, action, &environment)),
            ThreadCheck::capture(options.thread_checks),
            options.diagnostics,
        )
    }

    fn from_parts(
        initial: S,
        reducer: ReduceFn<S, A>,
        thread_check: ThreadCheck,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial),
                queue: Mutex::new(Queue {
                    actions: VecDeque::new(),
                    sending: false,
                }),
                reducer,
                effects: CompositeDisposable::new(),
                observers: Observers::new(),
                thread_check,
                diagnostics,
                parent: Mutex::new(None),
                broadcasts: AtomicU64::new(0),
            }),
        }
    }

    /// Queue `action` and, unless a drain is already running, process the
    /// queue until it is empty.
    ///
    /// Returns once every action queued synchronously along the way has been
    /// reduced and the resulting state broadcast.
    ///
    /// # Panics
    /// On the owner thread, when a strict diagnostic was reported from another
    /// thread since the last send.
    pub fn send(&self, action: A) {
        let inner = &self.inner;
        if inner.thread_check.is_owner() {
            inner.diagnostics.assert_clean();
        }
        inner
            .thread_check
            .verify(&inner.diagnostics, || format!("Store::send({})", action.label()));

        {
            let mut queue = inner.queue.lock();
            queue.actions.push_back(action);
            if queue.sending {
                return;
            }
            queue.sending = true;
        }
        self.drain();
    }

    fn drain(&self) {
        let inner = &*self.inner;
        let _current = inner.diagnostics.enter();
        // A panicking reducer must not leave the store stuck in `sending`.
        let reset = scopeguard::guard(&inner.queue, |queue| queue.lock().sending = false);

        loop {
            let next = inner.queue.lock().actions.pop_front();
            let Some(action) = next else {
                let mut queue = inner.queue.lock();
                if queue.actions.is_empty() {
                    queue.sending = false;
                    break;
                }
                continue;
            };

            tracing::trace!(action = ?action, "reducing action");
            // No state lock is held while the reducer runs: scoped reducers
            // send to their parent, whose observers may read this store.
            let effect = {
                let mut current = inner.state.read().clone();
                let effect = (inner.reducer)(&mut current, action);
                *inner.state.write() = current;
                effect
            };
            if !effect.is_none() {
                self.start_effect(effect);
            }
        }

        scopeguard::ScopeGuard::into_inner(reset);
        self.broadcast();
    }

    fn start_effect(&self, effect: Effect<A>) {
        let slot = Arc::new(EffectSlot {
            completed: AtomicBool::new(false),
            key: Mutex::new(None),
        });
        let store: Weak<StoreInner<S, A>> = Arc::downgrade(&self.inner);

        let sink = {
            let slot = Arc::clone(&slot);
            Sink::new(move |event| match event {
                Event::Next(action) => {
                    if let Some(inner) = store.upgrade() {
                        Store { inner }.send(action);
                    }
                }
                Event::Completed => {
                    slot.completed.store(true, Ordering::SeqCst);
                    let key = slot.key.lock().take();
                    let Some(inner) = store.upgrade() else {
                        return;
                    };
                    inner
                        .thread_check
                        .verify(&inner.diagnostics, || "effect completion".to_string());
                    if let Some(key) = key {
                        drop(inner.effects.remove(key));
                    }
                }
            })
        };

        let disposable = effect.subscribe(sink);
        if slot.completed.load(Ordering::SeqCst) {
            return;
        }
        let Some(key) = self.inner.effects.insert(disposable) else {
            return;
        };
        *slot.key.lock() = Some(key);
        // The effect may have completed on another thread before the key was
        // stored; in that case nobody else will remove it.
        if slot.completed.load(Ordering::SeqCst) {
            if let Some(key) = slot.key.lock().take() {
                drop(self.inner.effects.remove(key));
            }
        }
    }

    fn broadcast(&self) {
        self.inner.broadcasts.fetch_add(1, Ordering::SeqCst);
        if self.inner.observers.is_empty() {
            return;
        }
        let snapshot = self.inner.state.read().clone();
        self.inner.observers.notify(&snapshot);
    }

    /// A copy of the current state.
    pub fn state(&self) -> S {
        self.inner.state.read().clone()
    }

    /// Read the state in place. `read` must not send to this store.
    pub fn with_state<R>(&self, read: impl FnOnce(&S) -> R) -> R {
        read(&self.inner.state.read())
    }

    /// Call `observer` with the state after every broadcast.
    pub fn subscribe(&self, observer: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        self.inner.observers.add(observer)
    }

    /// Actions queued but not yet reduced.
    pub fn pending_action_count(&self) -> usize {
        self.inner.queue.lock().actions.len()
    }

    /// Effects subscribed by this store that have not completed.
    pub fn live_effect_count(&self) -> usize {
        self.inner.effects.len()
    }

    pub fn is_sending(&self) -> bool {
        self.inner.queue.lock().sending
    }

    /// How many times state has been broadcast.
    pub fn broadcast_count(&self) -> u64 {
        self.inner.broadcasts.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Cancel every running effect. Effects returned by later actions are
    /// cancelled as soon as they start.
    pub fn invalidate(&self) {
        tracing::debug!(effects = self.inner.effects.len(), "store invalidated");
        self.inner.effects.dispose();
    }
}

impl<S, A> std::fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("live_effects", &self.inner.effects.len())
            .field("broadcasts", &self.inner.broadcasts.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{Diagnostic, DiagnosticMode};

    #[derive(Debug, Clone, PartialEq)]
    enum Counter {
        Incr,
        Chain(u8),
        Boom,
    }

    impl Action for Counter {}

    fn reducer() -> Reducer<Vec<String>, Counter> {
        Reducer::new(|log: &mut Vec<String>, action, _| match action {
            Counter::Incr => {
                log.push("incr".into());
                Effect::none()
            }
            Counter::Chain(0) => {
                log.push("chain 0".into());
                Effect::none()
            }
            Counter::Chain(n) => {
                log.push(format!("chain {n}"));
                Effect::concatenate([
                    Effect::send(Counter::Chain(n - 1)),
                    Effect::send(Counter::Incr),
                ])
            }
            Counter::Boom => panic!("reducer exploded"),
        })
    }

    #[test]
    fn synchronous_effects_are_processed_in_fifo_order() {
        let store = Store::new(Vec::new(), reducer(), ());
        store.send(Counter::Chain(2));
        assert_eq!(
            store.state(),
            vec!["chain 2", "chain 1", "incr", "chain 0", "incr"]
        );
        assert_eq!(store.broadcast_count(), 1);
        assert_eq!(store.live_effect_count(), 0);
        assert!(!store.is_sending());
    }

    #[test]
    fn each_send_broadcasts_once() {
        let store = Store::new(Vec::new(), reducer(), ());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _subscription = store.subscribe(move |state: &Vec<String>| log.lock().push(state.len()));

        store.send(Counter::Incr);
        store.send(Counter::Chain(1));
        assert_eq!(*seen.lock(), vec![1, 4]);
    }

    #[test]
    fn panicking_reducer_leaves_the_store_usable() {
        let store = Store::new(Vec::new(), reducer(), ());
        let handle = store.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handle.send(Counter::Boom)
        }));
        assert!(result.is_err());
        assert!(!store.is_sending());
        store.send(Counter::Incr);
        assert_eq!(store.state(), vec!["incr"]);
    }

    #[test]
    fn sends_from_other_threads_are_reported() {
        let diagnostics = Diagnostics::new(DiagnosticMode::Log);
        let store = Store::with_options(
            Vec::new(),
            reducer(),
            (),
            StoreOptions {
                thread_checks: true,
                diagnostics: diagnostics.clone(),
            },
        );
        let remote = store.clone();
        std::thread::spawn(move || remote.send(Counter::Incr))
            .join()
            .unwrap();

        assert_eq!(store.state(), vec!["incr"]);
        assert!(matches!(
            diagnostics.history().as_slice(),
            [Diagnostic::ThreadViolation { operation, .. }] if operation == "Store::send(Incr)"
        ));
    }

    #[test]
    fn completions_from_other_threads_are_reported() {
        let diagnostics = Diagnostics::new(DiagnosticMode::Log);
        let reducer = Reducer::<(), Counter>::new(|_, _, _| {
            Effect::publisher(|sink| {
                std::thread::Builder::new()
                    .name("background".into())
                    .spawn(move || sink.complete())
                    .unwrap()
                    .join()
                    .unwrap();
                crate::effect::Disposable::empty()
            })
        });
        let store = Store::with_options(
            (),
            reducer,
            (),
            StoreOptions {
                thread_checks: true,
                diagnostics: diagnostics.clone(),
            },
        );

        store.send(Counter::Incr);
        assert_eq!(store.live_effect_count(), 0);
        assert_eq!(
            diagnostics.history(),
            vec![Diagnostic::ThreadViolation {
                operation: "effect completion".into(),
                thread: "background".into(),
            }]
        );
    }

    #[test]
    fn strict_failures_from_other_threads_fail_the_next_send() {
        let diagnostics = Diagnostics::new(DiagnosticMode::Strict);
        let store = Store::with_options(
            Vec::new(),
            reducer(),
            (),
            StoreOptions {
                thread_checks: true,
                diagnostics: diagnostics.clone(),
            },
        );
        let remote = store.clone();
        std::thread::spawn(move || remote.send(Counter::Incr))
            .join()
            .expect("the violation is held, not raised on the worker");
        assert_eq!(store.state(), vec!["incr"]);

        let raised = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.send(Counter::Incr)
        }));
        assert!(raised.is_err());
        store.send(Counter::Incr);
        assert_eq!(store.state(), vec!["incr", "incr"]);
    }

    #[test]
    fn dropping_the_store_cancels_running_effects() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let reducer = Reducer::<(), Counter>::new(move |_, _, _| {
            let flag = Arc::clone(&flag);
            Effect::publisher(move |_sink| {
                crate::effect::Disposable::new(move || flag.store(true, Ordering::SeqCst))
            })
        });
        let store = Store::new((), reducer, ());
        store.send(Counter::Incr);
        assert_eq!(store.live_effect_count(), 1);
        drop(store);
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
