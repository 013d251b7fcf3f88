//! Receivers for the values an effect produces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::disposable::Disposable;

/// What a running effect delivers to its subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<A> {
    /// An emitted action.
    Next(A),
    /// The effect terminated. Nothing follows.
    Completed,
}

/// Subscriber side of an effect.
///
/// A sink delivers at most one [`Event::Completed`] and nothing after it.
/// It is cheap to clone and safe to call from any thread.
pub struct Sink<A> {
    inner: Arc<SinkInner<A>>,
}

struct SinkInner<A> {
    on_event: Box<dyn Fn(Event<A>) + Send + Sync>,
    terminated: AtomicBool,
}

impl<A> Clone for Sink<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: Send + 'static> Sink<A> {
    pub fn new(on_event: impl Fn(Event<A>) + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                on_event: Box::new(on_event),
                terminated: AtomicBool::new(false),
            }),
        }
    }

    /// Deliver an action unless the sink already terminated.
    pub fn send(&self, action: A) {
        if self.inner.terminated.load(Ordering::SeqCst) {
            return;
        }
        (self.inner.on_event)(Event::Next(action));
    }

    /// Terminate. Later calls are no-ops.
    pub fn complete(&self) {
        if !self.inner.terminated.swap(true, Ordering::SeqCst) {
            (self.inner.on_event)(Event::Completed);
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// A sink of `B` that converts every value with `transform` before
    /// forwarding it here.
    pub fn contramap<B: Send + 'static>(
        &self,
        transform: impl Fn(B) -> A + Send + Sync + 'static,
    ) -> Sink<B> {
        let downstream = self.clone();
        Sink::new(move |event| match event {
            Event::Next(value) => downstream.send(transform(value)),
            Event::Completed => downstream.complete(),
        })
    }

    /// A forwarding sink that goes silent once the returned handle is disposed.
    pub(crate) fn guarded(&self) -> (Sink<A>, Disposable) {
        let open = Arc::new(AtomicBool::new(true));
        let gate = Arc::clone(&open);
        let downstream = self.clone();
        let sink = Sink::new(move |event| {
            if !gate.load(Ordering::SeqCst) {
                return;
            }
            match event {
                Event::Next(value) => downstream.send(value),
                Event::Completed => downstream.complete(),
            }
        });
        let close = Disposable::new(move || open.store(false, Ordering::SeqCst));
        (sink, close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording() -> (Sink<i32>, Arc<Mutex<Vec<Event<i32>>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = events.clone();
        (Sink::new(move |event| log.lock().push(event)), events)
    }

    #[test]
    fn nothing_is_delivered_after_completion() {
        let (sink, events) = recording();
        sink.send(1);
        sink.complete();
        sink.send(2);
        sink.complete();
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Completed]);
        assert!(sink.is_terminated());
    }

    #[test]
    fn contramap_converts_values() {
        let (sink, events) = recording();
        let strings = sink.contramap(|s: &'static str| s.len() as i32);
        strings.send("four");
        strings.complete();
        assert_eq!(*events.lock(), vec![Event::Next(4), Event::Completed]);
    }

    #[test]
    fn guarded_sink_goes_silent_after_close() {
        let (sink, events) = recording();
        let (guarded, close) = sink.guarded();
        guarded.send(1);
        close.dispose();
        guarded.send(2);
        guarded.complete();
        assert_eq!(*events.lock(), vec![Event::Next(1)]);
    }
}
