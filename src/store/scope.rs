//! Scoped stores: a projection of a parent store's state with its own
//! action type.
//!
//! A scoped store keeps a derived copy of its projection, refreshed on every
//! parent broadcast through a subscription that only weakly references the
//! child. Local actions are embedded and sent to the parent. The child
//! broadcasts them itself once its own drain finishes, so the subscription
//! stays quiet while the child is forwarding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Store;
use crate::effect::Effect;
use crate::reducer::{Action, State};

impl<S: State, A: Action> Store<S, A> {
    /// A store focused on `to_local(state)` that sends `from_local(action)`
    /// to this store.
    pub fn scope<LS: State, LA: Action>(
        &self,
        to_local: impl Fn(&S) -> LS + Send + Sync + 'static,
        from_local: impl Fn(LA) -> A + Send + Sync + 'static,
    ) -> Store<LS, LA> {
        self.inner
            .thread_check
            .verify(&self.inner.diagnostics, || "Store::scope".to_string());

        let to_local = Arc::new(to_local);
        let forwarding = Arc::new(AtomicBool::new(false));
        let initial = self.with_state(|state| to_local(state));

        let reducer = {
            let parent = self.clone();
            let to_local = Arc::clone(&to_local);
            let forwarding = Arc::clone(&forwarding);
            Box::new(move |local: &mut LS, action: LA| {
                forwarding.store(true, Ordering::SeqCst);
                let _reset =
                    scopeguard::guard(&forwarding, |flag| flag.store(false, Ordering::SeqCst));
                parent.send(from_local(action));
                *local = parent.with_state(|state| to_local(state));
                Effect::<LA>::none()
            })
        };
        let child = Store::from_parts(
            initial,
            reducer,
            self.inner.thread_check.clone(),
            self.inner.diagnostics.clone(),
        );

        let weak_child = Arc::downgrade(&child.inner);
        let subscription = self.subscribe(move |state: &S| {
            let Some(inner) = weak_child.upgrade() else {
                return;
            };
            *inner.state.write() = to_local(state);
            if !forwarding.load(Ordering::SeqCst) {
                Store { inner }.broadcast();
            }
        });
        *child.inner.parent.lock() = Some(subscription);
        child
    }

    /// [`scope`](Self::scope) with the parent's action type.
    pub fn scope_state<LS: State>(
        &self,
        to_local: impl Fn(&S) -> LS + Send + Sync + 'static,
    ) -> Store<LS, A> {
        self.scope(to_local, |action| action)
    }
}
