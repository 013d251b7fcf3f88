//! Reducers: state transitions that describe their side effects.
//!
//! ```text
//! Action ──→ Reducer(&mut State, Action, &Env) ──→ Effect<Action>
//!                        ↑                                │
//!                        └──────── emitted actions ───────┘
//! ```
//!
//! A reducer mutates the state it is handed and returns an [`Effect`] for
//! whatever asynchronous work the action implies. Reducers never fail; work
//! that can fail belongs in the effect.

mod debug;
mod focus;
mod for_each;

pub use focus::{CasePath, Lens, OptionalLens};

use std::fmt;
use std::sync::Arc;

use crate::effect::Effect;

/// Marker trait for actions.
///
/// Actions represent:
/// - User events (button taps, text input)
/// - Effect results (responses, timer ticks)
///
/// [`label`](Action::label) names the action in diagnostics and debug logs.
/// The default derives the variant name from `Debug`.
pub trait Action: fmt::Debug + Send + 'static {
    fn label(&self) -> String {
        variant_label(&format!("{self:?}"))
    }
}

/// Marker trait for store state.
pub trait State: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> State for T {}

/// `"Loaded(42)"` → `"Loaded"`, `"Row { id: 1 }"` → `"Row"`.
fn variant_label(debug: &str) -> String {
    let end = debug
        .find(|c: char| c == '(' || c == ' ' || c == '{')
        .unwrap_or(debug.len());
    debug[..end].to_string()
}

type ReduceFn<S, A, E> = dyn Fn(&mut S, A, &E) -> Effect<A> + Send + Sync;

/// A composable state transition over state `S`, actions `A` and an
/// environment of dependencies `E`.
pub struct Reducer<S, A, E = ()> {
    reduce: Arc<ReduceFn<S, A, E>>,
}

impl<S, A, E> Clone for Reducer<S, A, E> {
    fn clone(&self) -> Self {
        Self {
            reduce: Arc::clone(&self.reduce),
        }
    }
}

impl<S, A, E> fmt::Debug for Reducer<S, A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer").finish_non_exhaustive()
    }
}

impl<S: 'static, A: Send + 'static, E: 'static> Reducer<S, A, E> {
    pub fn new(reduce: impl Fn(&mut S, A, &E) -> Effect<A> + Send + Sync + 'static) -> Self {
        Self {
            reduce: Arc::new(reduce),
        }
    }

    /// Does nothing and returns no effect.
    pub fn empty() -> Self {
        Self::new(|_, _, _| Effect::none())
    }

    pub fn run(&self, state: &mut S, action: A, environment: &E) -> Effect<A> {
        (self.reduce)(state, action, environment)
    }

    /// Run every reducer, in order, against the same state and action, and
    /// merge their effects.
    pub fn combine(reducers: impl IntoIterator<Item = Self>) -> Self
    where
        A: Clone,
    {
        let reducers: Vec<Self> = reducers.into_iter().collect();
        Self::new(move |state, action, environment| {
            let Some((last, rest)) = reducers.split_last() else {
                return Effect::none();
            };
            let mut effects = Vec::with_capacity(reducers.len());
            for reducer in rest {
                effects.push(reducer.run(state, action.clone(), environment));
            }
            effects.push(last.run(state, action, environment));
            Effect::merge(effects)
        })
    }

    pub fn combined_with(self, other: Self) -> Self
    where
        A: Clone,
    {
        Self::combine([self, other])
    }

    /// A reducer that mutates state regardless of the action.
    pub fn state_only(mutate: impl Fn(&mut S) + Send + Sync + 'static) -> Self {
        Self::new(move |state, _, _| {
            mutate(state);
            Effect::none()
        })
    }

    /// A reducer that never touches state, only produces effects.
    pub fn action_only(produce: impl Fn(A, &E) -> Effect<A> + Send + Sync + 'static) -> Self {
        Self::new(move |_, action, environment| produce(action, environment))
    }

    /// A reducer that mutates state and never returns an effect.
    pub fn mutation(mutate: impl Fn(&mut S, A, &E) + Send + Sync + 'static) -> Self {
        Self::new(move |state, action, environment| {
            mutate(state, action, environment);
            Effect::none()
        })
    }

    /// This reducer with its effects dropped unsubscribed.
    pub fn without_effects(self) -> Self {
        Self::new(move |state, action, environment| {
            drop(self.run(state, action, environment));
            Effect::none()
        })
    }
}
