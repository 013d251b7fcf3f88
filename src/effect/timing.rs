//! Time-based effect operators.
//!
//! Each operator is assembled from a [`Scheduler`](crate::scheduler::Scheduler) and, where work has to be
//! replaced or stopped by id, [`Effect::cancellable`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::disposable::{CompositeDisposable, Disposable, SerialDisposable};
use super::sink::{Event, Sink};
use super::Effect;
use crate::cancellation::{CancelId, CancelKey, CancellationRegistry, Throttled};
use crate::scheduler::SharedScheduler;

impl<A: Send + 'static> Effect<A> {
    /// Subscribe to this effect only after `due` has elapsed on `scheduler`.
    pub fn deferred(self, due: Duration, scheduler: SharedScheduler) -> Effect<A> {
        if self.is_none() {
            return self;
        }
        Effect::publisher(move |sink| {
            let handles = CompositeDisposable::new();
            let started = handles.clone();
            let job = scheduler.schedule_after(
                due,
                Box::new(move || {
                    let _ = started.insert(self.subscribe(sink));
                }),
            );
            let _ = handles.insert(job);
            Disposable::new(move || handles.dispose())
        })
    }

    /// Start this effect after `due`, restarting the wait whenever another
    /// debounced effect with the same `id` arrives first.
    pub fn debounce(
        self,
        registry: &CancellationRegistry,
        id: impl CancelKey,
        due: Duration,
        scheduler: SharedScheduler,
    ) -> Effect<A> {
        if self.is_none() {
            return self;
        }
        self.deferred(due, scheduler)
            .cancellable(registry, id, true)
    }

    /// Deliver at most one action per `interval` for `id`.
    ///
    /// The first action of a window goes out immediately. Later ones are held
    /// until the window closes; `latest` picks whether the newest or the
    /// first held action is delivered then.
    pub fn throttle(
        self,
        registry: &CancellationRegistry,
        id: impl CancelKey,
        interval: Duration,
        scheduler: SharedScheduler,
        latest: bool,
    ) -> Effect<A> {
        if self.is_none() {
            return self;
        }
        let id = CancelId::new(id);
        let window = registry.clone();
        let window_id = id.clone();

        Effect::publisher(move |sink| {
            let delayed = CompositeDisposable::new();
            let outstanding = Arc::new(Mutex::new(Outstanding::default()));

            let upstream = {
                let delayed = delayed.clone();
                let outstanding = Arc::clone(&outstanding);
                let sink = sink.clone();
                Sink::new(move |event| match event {
                    Event::Next(action) => {
                        let offered =
                            window.throttle_offer(&window_id, &scheduler, interval, action, latest);
                        match offered {
                            Throttled::Emit(action) => sink.send(action),
                            Throttled::Delay(wait) => {
                                outstanding.lock().delayed += 1;
                                let fire = {
                                    let window = window.clone();
                                    let id = window_id.clone();
                                    let scheduler = Arc::clone(&scheduler);
                                    let outstanding = Arc::clone(&outstanding);
                                    let sink = sink.clone();
                                    Box::new(move || {
                                        if let Some(action) =
                                            window.throttle_fire::<A>(&id, scheduler.now())
                                        {
                                            sink.send(action);
                                        }
                                        if outstanding.lock().finish_delayed() {
                                            sink.complete();
                                        }
                                    })
                                };
                                let _ = delayed.insert(scheduler.schedule_after(wait, fire));
                            }
                        }
                    }
                    Event::Completed => {
                        if outstanding.lock().finish_upstream() {
                            sink.complete();
                        }
                    }
                })
            };

            let _ = delayed.insert(self.subscribe(upstream));
            Disposable::new(move || delayed.dispose())
        })
        .cancellable(registry, id, true)
    }

    /// Re-deliver every event through `scheduler`, in order.
    pub fn receive_on(self, scheduler: SharedScheduler) -> Effect<A> {
        if self.is_none() {
            return self;
        }
        Effect::publisher(move |sink| {
            let (downstream, close) = sink.guarded();
            let buffer: Arc<Mutex<VecDeque<Event<A>>>> = Arc::new(Mutex::new(VecDeque::new()));

            let hop = Sink::new(move |event| {
                buffer.lock().push_back(event);
                let buffer = Arc::clone(&buffer);
                let downstream = downstream.clone();
                let _ = scheduler.schedule(Box::new(move || {
                    let next = buffer.lock().pop_front();
                    match next {
                        Some(Event::Next(action)) => downstream.send(action),
                        Some(Event::Completed) => downstream.complete(),
                        None => {}
                    }
                }));
            });

            let upstream = self.subscribe(hop);
            Disposable::new(move || {
                close.dispose();
                upstream.dispose();
            })
        })
    }
}

impl Effect<u64> {
    /// Emits `0, 1, 2, …` every `every` until cancelled through `id`.
    pub fn timer(
        registry: &CancellationRegistry,
        id: impl CancelKey,
        every: Duration,
        scheduler: SharedScheduler,
    ) -> Effect<u64> {
        Effect::publisher(move |sink| {
            let slot = SerialDisposable::new();
            schedule_tick(scheduler, every, 0, sink, slot.clone());
            Disposable::new(move || slot.dispose())
        })
        .cancellable(registry, id, false)
    }
}

fn schedule_tick(
    scheduler: SharedScheduler,
    every: Duration,
    tick: u64,
    sink: Sink<u64>,
    slot: SerialDisposable,
) {
    let next = (Arc::clone(&scheduler), slot.clone());
    let handle = scheduler.schedule_after(
        every,
        Box::new(move || {
            if sink.is_terminated() {
                return;
            }
            sink.send(tick);
            let (scheduler, slot) = next;
            schedule_tick(scheduler, every, tick + 1, sink, slot);
        }),
    );
    slot.set(handle);
}

#[derive(Default)]
struct Outstanding {
    delayed: usize,
    upstream_done: bool,
}

impl Outstanding {
    /// Returns true when nothing is left to deliver.
    fn finish_delayed(&mut self) -> bool {
        self.delayed = self.delayed.saturating_sub(1);
        self.upstream_done && self.delayed == 0
    }

    fn finish_upstream(&mut self) -> bool {
        self.upstream_done = true;
        self.delayed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Scheduler, TestScheduler};

    fn recorder<A: Send + 'static>() -> (Sink<A>, Arc<Mutex<Vec<Event<A>>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&events);
        (Sink::new(move |event| log.lock().push(event)), events)
    }

    #[test]
    fn deferred_waits_for_the_clock() {
        let scheduler = TestScheduler::new();
        let (sink, events) = recorder();
        let _h = Effect::send(1)
            .deferred(Duration::from_secs(1), scheduler.shared())
            .subscribe(sink);

        scheduler.advance(Duration::from_millis(500));
        assert!(events.lock().is_empty());
        scheduler.advance(Duration::from_millis(500));
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Completed]);
    }

    #[test]
    fn debounce_keeps_only_the_last_effect() {
        let scheduler = TestScheduler::new();
        let registry = CancellationRegistry::new();
        let (sink_a, events_a) = recorder();
        let (sink_b, events_b) = recorder();

        let _a = Effect::send("a")
            .debounce(&registry, "query", Duration::from_secs(1), scheduler.shared())
            .subscribe(sink_a);
        scheduler.advance(Duration::from_millis(600));
        let _b = Effect::send("b")
            .debounce(&registry, "query", Duration::from_secs(1), scheduler.shared())
            .subscribe(sink_b);

        scheduler.advance(Duration::from_millis(600));
        assert_eq!(*events_a.lock(), vec![Event::Completed]);
        assert!(events_b.lock().is_empty());

        scheduler.advance(Duration::from_millis(400));
        assert_eq!(*events_b.lock(), vec![Event::Next("b"), Event::Completed]);
        assert!(registry.is_empty());
    }

    #[test]
    fn throttle_emits_leading_then_latest() {
        let scheduler = TestScheduler::new();
        let registry = CancellationRegistry::new();
        let interval = Duration::from_secs(1);
        let out = Arc::new(Mutex::new(Vec::new()));

        let send = |value: i32| {
            let log = Arc::clone(&out);
            let _ = Effect::send(value)
                .throttle(&registry, "scroll", interval, scheduler.shared(), true)
                .subscribe(Sink::new(move |event| {
                    if let Event::Next(value) = event {
                        log.lock().push(value);
                    }
                }));
        };
        send(1);
        scheduler.advance(Duration::from_millis(100));
        send(2);
        scheduler.advance(Duration::from_millis(100));
        send(3);
        assert_eq!(*out.lock(), vec![1]);

        scheduler.advance(Duration::from_millis(800));
        assert_eq!(*out.lock(), vec![1, 3]);
        assert_eq!(scheduler.now(), interval);
    }

    #[test]
    fn timer_ticks_until_cancelled() {
        let scheduler = TestScheduler::new();
        let registry = CancellationRegistry::new();
        let (sink, events) = recorder();
        let _h = Effect::<u64>::timer(&registry, "tick", Duration::from_secs(1), scheduler.shared())
            .subscribe(sink);

        scheduler.advance(Duration::from_secs(3));
        registry.cancel("tick");
        scheduler.advance(Duration::from_secs(3));
        assert_eq!(
            *events.lock(),
            vec![Event::Next(0), Event::Next(1), Event::Next(2), Event::Completed]
        );
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn receive_on_hops_through_the_scheduler() {
        let scheduler = TestScheduler::new();
        let (sink, events) = recorder();
        let _h = Effect::from_iter([1, 2])
            .receive_on(scheduler.shared())
            .subscribe(sink);
        assert!(events.lock().is_empty());
        scheduler.run();
        assert_eq!(
            *events.lock(),
            vec![Event::Next(1), Event::Next(2), Event::Completed]
        );
    }
}
