//! Clocks for time-based effects.
//!
//! Debounce, throttle, delays and timers never read the wall clock directly.
//! They go through a [`Scheduler`], so production code can use
//! [`TokioScheduler`] or a [`MainQueue`] pumped by the owner thread, while
//! tests drive a [`TestScheduler`] by hand.

mod queue;

use std::sync::Arc;
use std::time::{Duration, Instant};

use queue::TimerQueue;

use crate::effect::Disposable;

/// Unit of scheduled work.
pub type Job = Box<dyn FnOnce() + Send>;

/// Source of time and deferred execution.
pub trait Scheduler: Send + Sync + 'static {
    /// Monotonic time since the scheduler started.
    fn now(&self) -> Duration;

    /// Run `job` as soon as possible.
    fn schedule(&self, job: Job) -> Disposable {
        self.schedule_after(Duration::ZERO, job)
    }

    /// Run `job` once `delay` has elapsed. Disposing the handle before then
    /// prevents it from running.
    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable;
}

pub type SharedScheduler = Arc<dyn Scheduler>;

/// Runs every job inline on the calling thread, ignoring delays.
///
/// Suitable for `receive_on` and one-shot delays in tests. A timer on this
/// scheduler never yields.
#[derive(Debug, Clone)]
pub struct ImmediateScheduler {
    start: Instant,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ImmediateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn schedule_after(&self, _delay: Duration, job: Job) -> Disposable {
        job();
        Disposable::empty()
    }
}

/// Virtual clock advanced explicitly by tests.
///
/// Jobs run on the thread that advances the clock. Jobs due at the same time
/// run in the order they were scheduled, and jobs scheduled while advancing
/// run in the same call if they fall due before the target time.
#[derive(Clone, Default)]
pub struct TestScheduler {
    inner: Arc<TestInner>,
}

#[derive(Default)]
struct TestInner {
    now: parking_lot::Mutex<Duration>,
    queue: TimerQueue,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// This scheduler as a shareable trait object. Clones share the clock.
    pub fn shared(&self) -> SharedScheduler {
        Arc::new(self.clone())
    }

    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        self.advance_to(target);
    }

    /// Run every job due at or before `target`, moving the clock to each
    /// job's due time before running it, then settle at `target`.
    pub fn advance_to(&self, target: Duration) {
        while let Some((due, job)) = self.inner.queue.pop_due(target) {
            {
                let mut now = self.inner.now.lock();
                if due > *now {
                    *now = due;
                }
            }
            job();
        }
        let mut now = self.inner.now.lock();
        if target > *now {
            *now = target;
        }
    }

    /// Run until no jobs are left. Does not return while a timer is live.
    pub fn run(&self) {
        while let Some(due) = self.inner.queue.next_due() {
            self.advance_to(due);
        }
    }

    /// Jobs waiting for the clock.
    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }
}

impl Scheduler for TestScheduler {
    fn now(&self) -> Duration {
        *self.inner.now.lock()
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        let due = self.now() + delay;
        self.inner.queue.push(due, job)
    }
}

impl std::fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Real-clock queue drained by the owner thread.
///
/// Effects schedule from any thread; jobs run only when the owner calls
/// [`run_pending`](Self::run_pending) from its event loop.
#[derive(Clone)]
pub struct MainQueue {
    inner: Arc<MainInner>,
}

struct MainInner {
    start: Instant,
    queue: TimerQueue,
}

impl MainQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MainInner {
                start: Instant::now(),
                queue: TimerQueue::default(),
            }),
        }
    }

    pub fn shared(&self) -> SharedScheduler {
        Arc::new(self.clone())
    }

    /// Run every job that is due now. Jobs scheduled while running wait for
    /// the next call. Returns how many jobs ran.
    pub fn run_pending(&self) -> usize {
        let now = self.now();
        let mut ran = 0;
        while let Some((_, job)) = self.inner.queue.pop_due(now) {
            job();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(jobs = ran, "main queue pumped");
        }
        ran
    }

    /// Time until the earliest job is due, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        let now = self.now();
        self.inner
            .queue
            .next_due()
            .map(|due| due.saturating_sub(now))
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for MainQueue {
    fn now(&self) -> Duration {
        self.inner.start.elapsed()
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        let due = self.now() + delay;
        self.inner.queue.push(due, job)
    }
}

impl std::fmt::Debug for MainQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainQueue")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Timers on a tokio runtime. Each job is a spawned task; disposal aborts it.
///
/// Jobs run on runtime worker threads, so their relative order is not
/// guaranteed.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
    start: tokio::time::Instant,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            start: tokio::time::Instant::now(),
        }
    }

    /// Scheduler for the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }

    pub fn shared(&self) -> SharedScheduler {
        Arc::new(self.clone())
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn schedule_after(&self, delay: Duration, job: Job) -> Disposable {
        let task = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            job();
        });
        Disposable::new(move || task.abort())
    }
}
