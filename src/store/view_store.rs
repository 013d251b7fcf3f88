//! Deduplicated observation of a store.

use std::sync::Arc;

use parking_lot::RwLock;

use super::observers::{Observers, Subscription};
use super::Store;
use crate::reducer::{Action, State};

type IsDuplicate<V> = Box<dyn Fn(&V, &V) -> bool + Send + Sync>;

/// The latest distinct state of a store, for rendering.
///
/// A view store skips broadcasts whose state is a duplicate of the last
/// accepted one, so observers never see the same value twice in a row.
/// Actions are sent straight to the underlying store.
pub struct ViewStore<V, A> {
    store: Store<V, A>,
    core: Arc<ViewCore<V>>,
    _parent: Arc<Subscription>,
}

impl<V, A> Clone for ViewStore<V, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            core: Arc::clone(&self.core),
            _parent: Arc::clone(&self._parent),
        }
    }
}

struct ViewCore<V> {
    value: RwLock<V>,
    is_duplicate: IsDuplicate<V>,
    observers: Observers<V>,
}

impl<V: 'static> ViewCore<V> {
    fn accept(&self, next: &V)
    where
        V: Clone,
    {
        {
            let mut value = self.value.write();
            if (self.is_duplicate)(&value, next) {
                return;
            }
            *value = next.clone();
        }
        self.observers.notify(next);
    }
}

impl<V: State, A: Action> ViewStore<V, A> {
    /// Observe `store`, treating states for which `is_duplicate(previous,
    /// next)` holds as unchanged.
    pub fn new(
        store: &Store<V, A>,
        is_duplicate: impl Fn(&V, &V) -> bool + Send + Sync + 'static,
    ) -> Self {
        let core = Arc::new(ViewCore {
            value: RwLock::new(store.state()),
            is_duplicate: Box::new(is_duplicate),
            observers: Observers::new(),
        });
        let parent = {
            let core = Arc::clone(&core);
            store.subscribe(move |state: &V| core.accept(state))
        };
        Self {
            store: store.clone(),
            core,
            _parent: Arc::new(parent),
        }
    }

    /// A view store deduplicating with `==`.
    pub fn deduplicated(store: &Store<V, A>) -> Self
    where
        V: PartialEq,
    {
        Self::new(store, |previous, next| previous == next)
    }

    pub fn state(&self) -> V {
        self.core.value.read().clone()
    }

    pub fn with_state<R>(&self, read: impl FnOnce(&V) -> R) -> R {
        read(&self.core.value.read())
    }

    pub fn send(&self, action: A) {
        self.store.send(action);
    }

    /// Call `observer` with every distinct state from now on.
    pub fn observe(&self, observer: impl Fn(&V) + Send + Sync + 'static) -> Subscription {
        self.core.observers.add(observer)
    }

    /// A two-way binding to one value derived from the state.
    pub fn binding<T>(
        &self,
        get: impl Fn(&V) -> T + Send + Sync + 'static,
        to_action: impl Fn(T) -> A + Send + Sync + 'static,
    ) -> Binding<V, A, T> {
        Binding {
            view: self.clone(),
            get: Arc::new(get),
            to_action: Arc::new(to_action),
        }
    }
}

impl<V, A> std::fmt::Debug for ViewStore<V, A>
where
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewStore")
            .field("state", &*self.core.value.read())
            .finish_non_exhaustive()
    }
}

/// Reads a value out of a view store and writes it back as an action.
pub struct Binding<V, A, T> {
    view: ViewStore<V, A>,
    get: Arc<dyn Fn(&V) -> T + Send + Sync>,
    to_action: Arc<dyn Fn(T) -> A + Send + Sync>,
}

impl<V, A, T> Clone for Binding<V, A, T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            get: Arc::clone(&self.get),
            to_action: Arc::clone(&self.to_action),
        }
    }
}

impl<V: State, A: Action, T> Binding<V, A, T> {
    pub fn get(&self) -> T {
        self.view.with_state(|state| (self.get)(state))
    }

    /// Send the action for `value`.
    pub fn set(&self, value: T) {
        self.view.send((self.to_action)(value));
    }
}
