//! Cancellation of in-flight effects by id.
//!
//! A [`CancellationRegistry`] maps every [`CancelId`] to the tokens of the
//! effect subscriptions currently running under it. An id is present exactly
//! while at least one of its subscriptions is live: tokens deregister on
//! completion and on cancellation, and the id is dropped with its last token.
//!
//! All map access goes through one re-entrant lock, so disposing a token from
//! inside another token's teardown (or from a reducer that runs while an
//! effect is being cancelled) does not deadlock.
//!
//! The registry is an ordinary value: create one per application (or per
//! test) and hand clones to whatever builds effects.

mod id;

pub use id::{CancelId, CancelKey};

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};

use crate::effect::{Disposable, Effect, Event, SerialDisposable, Sink};
use crate::scheduler::SharedScheduler;

type Tokens = HashMap<u64, Disposable>;

/// Process-wide (or test-wide) map from cancellation id to live effects.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    cancellables: ReentrantMutex<RefCell<HashMap<CancelId, Tokens>>>,
    next_token: AtomicU64,
    throttles: Mutex<HashMap<CancelId, ThrottleSlot>>,
}

/// Throttle window for one id, timed on the scheduler that opened it.
struct ThrottleSlot {
    clock: SharedScheduler,
    interval: Duration,
    last_emit: Option<Duration>,
    pending: Option<Box<dyn Any + Send>>,
}

impl ThrottleSlot {
    /// Nothing is held and the window has closed.
    fn is_spent(&self) -> bool {
        self.pending.is_none()
            && self
                .last_emit
                .map_or(true, |last| self.clock.now().saturating_sub(last) >= self.interval)
    }
}

/// Outcome of offering a value to a throttle window.
pub(crate) enum Throttled<A> {
    /// Outside the window: deliver now.
    Emit(A),
    /// Inside the window: the value was parked, fire after the delay.
    Delay(Duration),
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispose every effect currently registered under `id`.
    ///
    /// Never blocks on the cancelled work and is a no-op for unknown ids.
    pub fn cancel(&self, id: impl CancelKey) {
        self.cancel_id(&CancelId::new(id));
    }

    fn cancel_id(&self, id: &CancelId) {
        let guard = self.inner.cancellables.lock();
        let tokens: Vec<Disposable> = guard
            .borrow()
            .get(id)
            .map(|tokens| tokens.values().cloned().collect())
            .unwrap_or_default();
        if tokens.is_empty() {
            return;
        }
        tracing::debug!(id = ?id, tokens = tokens.len(), "cancelling effects");
        for token in tokens {
            token.dispose();
        }
    }

    /// Cancel every registered effect.
    pub fn cancel_all(&self) {
        let guard = self.inner.cancellables.lock();
        let ids: Vec<CancelId> = guard.borrow().keys().cloned().collect();
        for id in &ids {
            self.cancel_id(id);
        }
        drop(guard);
    }

    /// Whether any effect is running under `id`.
    pub fn is_active(&self, id: impl CancelKey) -> bool {
        self.active_count(id) > 0
    }

    /// Number of live subscriptions under `id`.
    pub fn active_count(&self, id: impl CancelKey) -> usize {
        let id = CancelId::new(id);
        let guard = self.inner.cancellables.lock();
        let count = guard.borrow().get(&id).map_or(0, HashMap::len);
        count
    }

    /// Number of ids with at least one live subscription.
    pub fn len(&self) -> usize {
        let guard = self.inner.cancellables.lock();
        let len = guard.borrow().len();
        len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `value` to the window of `id`. Spent windows of other ids are
    /// dropped on the way.
    pub(crate) fn throttle_offer<A: Send + 'static>(
        &self,
        id: &CancelId,
        clock: &SharedScheduler,
        interval: Duration,
        value: A,
        latest: bool,
    ) -> Throttled<A> {
        let now = clock.now();
        let mut throttles = self.inner.throttles.lock();
        throttles.retain(|key, slot| key == id || !slot.is_spent());
        let slot = throttles.entry(id.clone()).or_insert_with(|| ThrottleSlot {
            clock: Arc::clone(clock),
            interval,
            last_emit: None,
            pending: None,
        });
        slot.interval = interval;
        match slot.last_emit {
            Some(last) if now.saturating_sub(last) < interval => {
                let keep = if latest {
                    value
                } else {
                    slot.pending
                        .take()
                        .and_then(|pending| pending.downcast::<A>().ok())
                        .map_or(value, |pending| *pending)
                };
                slot.pending = Some(Box::new(keep));
                Throttled::Delay(last + interval - now)
            }
            _ => {
                slot.last_emit = Some(now);
                slot.pending = None;
                Throttled::Emit(value)
            }
        }
    }

    /// Take the value parked for `id`, if any, and open a new window at `now`.
    pub(crate) fn throttle_fire<A: Send + 'static>(&self, id: &CancelId, now: Duration) -> Option<A> {
        let mut throttles = self.inner.throttles.lock();
        let slot = throttles.get_mut(id)?;
        let value = slot.pending.take()?.downcast::<A>().ok()?;
        slot.last_emit = Some(now);
        Some(*value)
    }

    #[cfg(test)]
    fn throttle_slot_count(&self) -> usize {
        self.inner.throttles.lock().len()
    }
}

impl std::fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationRegistry")
            .field("ids", &self.len())
            .finish()
    }
}

impl RegistryInner {
    fn deregister(&self, id: &CancelId, token: u64) {
        let guard = self.cancellables.lock();
        let removed = {
            let mut map = guard.borrow_mut();
            let Some(tokens) = map.get_mut(id) else {
                return;
            };
            let removed = tokens.remove(&token);
            if tokens.is_empty() {
                map.remove(id);
                tracing::trace!(id = ?id, "cancellation id released");
            }
            removed
        };
        drop(removed);
    }
}

/// Per-subscription state of a cancellable effect.
struct Registration {
    cancelled: AtomicBool,
    upstream: SerialDisposable,
}

impl<A: Send + 'static> Effect<A> {
    /// Make this effect cancellable through `registry` under `id`.
    ///
    /// With `cancel_in_flight`, effects already running under `id` are
    /// cancelled before this one starts, under the same lock acquisition that
    /// registers it; the old effects deliver nothing once the new one is live.
    pub fn cancellable(
        self,
        registry: &CancellationRegistry,
        id: impl CancelKey,
        cancel_in_flight: bool,
    ) -> Effect<A> {
        let id = CancelId::new(id);
        if self.is_none() {
            return if cancel_in_flight {
                Effect::cancel(registry, id)
            } else {
                Effect::none()
            };
        }

        let registry = registry.clone();
        Effect::publisher(move |sink| {
            let inner = &registry.inner;
            let guard = inner.cancellables.lock();

            if cancel_in_flight {
                registry.cancel_id(&id);
            }

            let token_key = inner.next_token.fetch_add(1, Ordering::Relaxed);
            let registration = Arc::new(Registration {
                cancelled: AtomicBool::new(false),
                upstream: SerialDisposable::new(),
            });
            let weak: Weak<RegistryInner> = Arc::downgrade(inner);

            let token = {
                let registration = Arc::clone(&registration);
                let weak = weak.clone();
                let id = id.clone();
                let sink = sink.clone();
                Disposable::new(move || {
                    registration.cancelled.store(true, Ordering::SeqCst);
                    if let Some(inner) = weak.upgrade() {
                        inner.deregister(&id, token_key);
                    }
                    registration.upstream.dispose();
                    sink.complete();
                })
            };
            guard
                .borrow_mut()
                .entry(id.clone())
                .or_default()
                .insert(token_key, token.clone());
            tracing::debug!(id = ?id, token = token_key, "effect registered");

            let forward = {
                let registration = Arc::clone(&registration);
                let id = id.clone();
                Sink::new(move |event| {
                    if registration.cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    match event {
                        Event::Next(action) => sink.send(action),
                        Event::Completed => {
                            if let Some(inner) = weak.upgrade() {
                                inner.deregister(&id, token_key);
                            }
                            sink.complete();
                        }
                    }
                })
            };
            registration.upstream.set(self.subscribe(forward));
            drop(guard);
            token
        })
    }

    /// Cancels every effect running under `id` when subscribed.
    pub fn cancel(registry: &CancellationRegistry, id: impl CancelKey) -> Effect<A> {
        let registry = registry.clone();
        let id = CancelId::new(id);
        Effect::fire_and_forget(move || registry.cancel_id(&id))
    }

    /// Cancels every effect running under any of `ids` when subscribed.
    pub fn cancel_all<K: CancelKey>(
        registry: &CancellationRegistry,
        ids: impl IntoIterator<Item = K>,
    ) -> Effect<A> {
        let registry = registry.clone();
        let ids: Vec<CancelId> = ids.into_iter().map(CancelId::new).collect();
        Effect::fire_and_forget(move || {
            for id in &ids {
                registry.cancel_id(id);
            }
        })
    }
}
