//! Subscription plumbing for merged and concatenated effects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::disposable::{CompositeDisposable, Disposable, SerialDisposable};
use super::sink::{Event, Sink};
use super::Effect;

pub(super) fn subscribe_merged<A: Send + 'static>(
    effects: Vec<Effect<A>>,
    sink: Sink<A>,
) -> Disposable {
    let remaining = Arc::new(AtomicUsize::new(effects.len()));
    let children = CompositeDisposable::new();

    for effect in effects {
        let remaining = Arc::clone(&remaining);
        let downstream = sink.clone();
        let child = Sink::new(move |event| match event {
            Event::Next(action) => downstream.send(action),
            Event::Completed => {
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    downstream.complete();
                }
            }
        });
        let _ = children.insert(effect.subscribe(child));
    }

    Disposable::new(move || children.dispose())
}

pub(super) fn subscribe_concatenated<A: Send + 'static>(
    effects: Vec<Effect<A>>,
    sink: Sink<A>,
) -> Disposable {
    let sequence = Arc::new(Sequence {
        state: Mutex::new(SequenceState {
            queue: effects.into(),
            subscribing: false,
            advance: false,
            disposed: false,
        }),
        current: SerialDisposable::new(),
        downstream: sink,
    });
    sequence.advance();

    Disposable::new(move || sequence.dispose())
}

struct Sequence<A> {
    state: Mutex<SequenceState<A>>,
    current: SerialDisposable,
    downstream: Sink<A>,
}

struct SequenceState<A> {
    queue: VecDeque<Effect<A>>,
    /// Set while a child is being subscribed on some thread.
    subscribing: bool,
    /// A child completed while `subscribing` was set.
    advance: bool,
    disposed: bool,
}

impl<A: Send + 'static> Sequence<A> {
    /// Start the next child, or complete when none are left.
    ///
    /// A child that completes during its own subscription only records the
    /// request; the subscribing loop picks it up so the slot is never
    /// overwritten with a stale handle.
    fn advance(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.subscribing {
                state.advance = true;
                return;
            }
            state.subscribing = true;
        }

        loop {
            let next = {
                let mut state = self.state.lock();
                state.advance = false;
                if state.disposed {
                    state.subscribing = false;
                    return;
                }
                let next = state.queue.pop_front();
                if next.is_none() {
                    state.subscribing = false;
                }
                next
            };

            let Some(effect) = next else {
                self.current.dispose();
                self.downstream.complete();
                return;
            };

            let this = Arc::clone(self);
            let child = Sink::new(move |event| match event {
                Event::Next(action) => this.downstream.send(action),
                Event::Completed => this.advance(),
            });
            self.current.set(effect.subscribe(child));

            let mut state = self.state.lock();
            if !state.advance {
                state.subscribing = false;
                return;
            }
        }
    }

    fn dispose(&self) {
        let dropped = {
            let mut state = self.state.lock();
            state.disposed = true;
            std::mem::take(&mut state.queue)
        };
        drop(dropped);
        self.current.dispose();
    }
}
