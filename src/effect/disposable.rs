//! Disposal handles for effect subscriptions.
//!
//! Every running effect is represented by a [`Disposable`]. Disposal is
//! idempotent: the teardown closure runs at most once no matter how many
//! clones of the handle are disposed, or from how many threads.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle that tears down a subscription.
///
/// Clones share the same teardown, so disposing any clone disposes all of them.
#[derive(Clone)]
pub struct Disposable {
    teardown: Arc<Mutex<Option<Teardown>>>,
}

impl Disposable {
    /// Create a handle that runs `teardown` on first disposal.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Arc::new(Mutex::new(Some(Box::new(teardown)))),
        }
    }

    /// A handle with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            teardown: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the teardown if it has not run yet.
    pub fn dispose(&self) {
        // Take under the lock, run outside it: teardowns may dispose other handles.
        let teardown = self.teardown.lock().take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// True once there is nothing left to tear down.
    pub fn is_disposed(&self) -> bool {
        self.teardown.lock().is_none()
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Key returned by [`CompositeDisposable::insert`].
pub type DisposeKey = u64;

/// A keyed set of disposables torn down together.
///
/// Inserting into an already disposed composite disposes the new handle
/// immediately.
#[derive(Clone, Default)]
pub struct CompositeDisposable {
    inner: Arc<Mutex<CompositeInner>>,
}

#[derive(Default)]
struct CompositeInner {
    entries: HashMap<DisposeKey, Disposable>,
    next_key: DisposeKey,
    disposed: bool,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `disposable`. Returns `None` if the composite was already disposed.
    pub fn insert(&self, disposable: Disposable) -> Option<DisposeKey> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            drop(inner);
            disposable.dispose();
            return None;
        }
        let key = inner.next_key;
        inner.next_key += 1;
        inner.entries.insert(key, disposable);
        Some(key)
    }

    /// Stop tracking an entry without disposing it.
    pub fn remove(&self, key: DisposeKey) -> Option<Disposable> {
        self.inner.lock().entries.remove(&key)
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every tracked entry and refuse future insertions.
    pub fn dispose(&self) {
        let entries = {
            let mut inner = self.inner.lock();
            inner.disposed = true;
            std::mem::take(&mut inner.entries)
        };
        for (_, disposable) in entries {
            disposable.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }
}

/// A single replaceable slot. Setting a new disposable disposes the previous one.
#[derive(Clone, Default)]
pub struct SerialDisposable {
    inner: Arc<Mutex<SerialInner>>,
}

#[derive(Default)]
struct SerialInner {
    current: Option<Disposable>,
    disposed: bool,
}

impl SerialDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current disposable. After [`dispose`](Self::dispose), the
    /// incoming handle is disposed right away.
    pub fn set(&self, disposable: Disposable) {
        let previous = {
            let mut inner = self.inner.lock();
            if inner.disposed {
                None
            } else {
                Some(inner.current.replace(disposable.clone()))
            }
        };
        match previous {
            None => disposable.dispose(),
            Some(Some(old)) => old.dispose(),
            Some(None) => {}
        }
    }

    pub fn dispose(&self) {
        let current = {
            let mut inner = self.inner.lock();
            inner.disposed = true;
            inner.current.take()
        };
        if let Some(current) = current {
            current.dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }
}
