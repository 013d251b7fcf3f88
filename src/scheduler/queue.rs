//! Ordered job queue shared by the clocked schedulers.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use super::Job;
use crate::effect::Disposable;

/// Jobs keyed by due time, then by insertion order.
#[derive(Clone, Default)]
pub(super) struct TimerQueue {
    inner: Arc<Mutex<QueueInner>>,
}

#[derive(Default)]
struct QueueInner {
    jobs: BTreeMap<(Duration, u64), Job>,
    next_seq: u64,
}

impl TimerQueue {
    /// Enqueue `job`; disposing the handle removes it if it has not run.
    pub(super) fn push(&self, due: Duration, job: Job) -> Disposable {
        let key = {
            let mut inner = self.inner.lock();
            let key = (due, inner.next_seq);
            inner.next_seq += 1;
            inner.jobs.insert(key, job);
            key
        };
        let queue: Weak<Mutex<QueueInner>> = Arc::downgrade(&self.inner);
        Disposable::new(move || {
            if let Some(queue) = queue.upgrade() {
                let removed = queue.lock().jobs.remove(&key);
                drop(removed);
            }
        })
    }

    /// Remove and return the earliest job due at or before `now`.
    pub(super) fn pop_due(&self, now: Duration) -> Option<(Duration, Job)> {
        let mut inner = self.inner.lock();
        let (&key, _) = inner.jobs.first_key_value()?;
        if key.0 > now {
            return None;
        }
        inner.jobs.remove(&key).map(|job| (key.0, job))
    }

    pub(super) fn next_due(&self) -> Option<Duration> {
        self.inner.lock().jobs.first_key_value().map(|(key, _)| key.0)
    }

    pub(super) fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }
}
