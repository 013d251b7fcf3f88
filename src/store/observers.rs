//! Observer lists for state broadcasts.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callbacks notified with every broadcast value.
pub(crate) struct Observers<T> {
    list: Arc<Mutex<ObserverList<T>>>,
}

struct ObserverList<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

impl<T: 'static> Observers<T> {
    pub(crate) fn new() -> Self {
        Self {
            list: Arc::new(Mutex::new(ObserverList {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut list = self.list.lock();
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push((id, Arc::new(callback)));
            id
        };
        let list: Weak<Mutex<ObserverList<T>>> = Arc::downgrade(&self.list);
        Subscription::new(move || {
            if let Some(list) = list.upgrade() {
                let removed = {
                    let mut list = list.lock();
                    list.entries
                        .iter()
                        .position(|(entry, _)| *entry == id)
                        .map(|index| list.entries.remove(index))
                };
                drop(removed);
            }
        })
    }

    /// Call every observer with `value`. Observers added or removed by a
    /// callback take effect from the next notification.
    pub(crate) fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .list
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(value);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.lock().entries.is_empty()
    }
}

/// Keeps an observer registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
