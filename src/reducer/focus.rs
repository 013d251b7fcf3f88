//! Focusing reducers on part of a larger state and action.

use std::panic::Location;
use std::sync::Arc;

use super::{Action, Reducer};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::effect::Effect;

type Get<R, V> = dyn Fn(&R) -> &V + Send + Sync;
type GetMut<R, V> = dyn Fn(&mut R) -> &mut V + Send + Sync;

/// Read and write access to a field `Value` inside `Root`.
pub struct Lens<Root, Value> {
    get: Arc<Get<Root, Value>>,
    get_mut: Arc<GetMut<Root, Value>>,
}

impl<Root, Value> Clone for Lens<Root, Value> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            get_mut: Arc::clone(&self.get_mut),
        }
    }
}

impl<Root: 'static, Value: 'static> Lens<Root, Value> {
    pub fn new(
        get: impl Fn(&Root) -> &Value + Send + Sync + 'static,
        get_mut: impl Fn(&mut Root) -> &mut Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Arc::new(get),
            get_mut: Arc::new(get_mut),
        }
    }

    pub fn get<'a>(&self, root: &'a Root) -> &'a Value {
        (self.get)(root)
    }

    pub fn get_mut<'a>(&self, root: &'a mut Root) -> &'a mut Value {
        (self.get_mut)(root)
    }
}

impl<Root: 'static> Lens<Root, Root> {
    pub fn identity() -> Self {
        Self::new(|root| root, |root| root)
    }
}

type ExtractMut<R, V> = dyn Fn(&mut R) -> Option<&mut V> + Send + Sync;

/// Write access to a `Value` that may be absent from `Root`: an enum case or
/// an optional field.
pub struct OptionalLens<Root, Value> {
    extract_mut: Arc<ExtractMut<Root, Value>>,
}

impl<Root, Value> Clone for OptionalLens<Root, Value> {
    fn clone(&self) -> Self {
        Self {
            extract_mut: Arc::clone(&self.extract_mut),
        }
    }
}

impl<Root: 'static, Value: 'static> OptionalLens<Root, Value> {
    pub fn new(extract_mut: impl Fn(&mut Root) -> Option<&mut Value> + Send + Sync + 'static) -> Self {
        Self {
            extract_mut: Arc::new(extract_mut),
        }
    }

    pub fn extract_mut<'a>(&self, root: &'a mut Root) -> Option<&'a mut Value> {
        (self.extract_mut)(root)
    }
}

/// Embeds a `Value` into `Root` and tries to extract it back out, like an
/// enum variant constructor paired with a match.
pub struct CasePath<Root, Value> {
    embed: Arc<dyn Fn(Value) -> Root + Send + Sync>,
    extract: Arc<dyn Fn(Root) -> Option<Value> + Send + Sync>,
}

impl<Root, Value> Clone for CasePath<Root, Value> {
    fn clone(&self) -> Self {
        Self {
            embed: Arc::clone(&self.embed),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<Root: 'static, Value: 'static> CasePath<Root, Value> {
    pub fn new(
        embed: impl Fn(Value) -> Root + Send + Sync + 'static,
        extract: impl Fn(Root) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            embed: Arc::new(embed),
            extract: Arc::new(extract),
        }
    }

    pub fn embed(&self, value: Value) -> Root {
        (self.embed)(value)
    }

    pub fn extract(&self, root: Root) -> Option<Value> {
        (self.extract)(root)
    }

    /// The embedding function on its own, for mapping effects.
    pub(crate) fn embedder(&self) -> Arc<dyn Fn(Value) -> Root + Send + Sync> {
        Arc::clone(&self.embed)
    }
}

impl<Root: 'static> CasePath<Root, Root> {
    pub fn identity() -> Self {
        Self::new(|root| root, Some)
    }
}

/// `"the reducer created at src/app.rs:42"`, for diagnostics.
pub(super) fn reducer_label(location: &Location<'_>) -> String {
    format!("the reducer created at {}:{}", location.file(), location.line())
}

impl<S: 'static, A: Send + 'static, E: 'static> Reducer<S, A, E> {
    /// Lift this reducer to a parent state reached through `state` and parent
    /// actions matching `action`. Other parent actions are ignored.
    pub fn pullback<GS: 'static, GA: Send + 'static, GE: 'static>(
        self,
        state: Lens<GS, S>,
        action: CasePath<GA, A>,
        environment: impl Fn(&GE) -> E + Send + Sync + 'static,
    ) -> Reducer<GS, GA, GE> {
        let embed = action.embedder();
        Reducer::new(move |global, global_action, global_env| {
            let Some(local_action) = action.extract(global_action) else {
                return Effect::none();
            };
            let local_env = environment(global_env);
            let embed = Arc::clone(&embed);
            self.run(state.get_mut(global), local_action, &local_env)
                .map(move |local| embed(local))
        })
    }

    /// Like [`pullback`](Self::pullback), for state that may be absent.
    ///
    /// A matching action that arrives while the state is absent is dropped
    /// and reported as [`Diagnostic::UnavailableState`].
    #[track_caller]
    pub fn pullback_case<GS: 'static, GA: Action, GE: 'static>(
        self,
        state: OptionalLens<GS, S>,
        action: CasePath<GA, A>,
        environment: impl Fn(&GE) -> E + Send + Sync + 'static,
    ) -> Reducer<GS, GA, GE> {
        let reducer = reducer_label(Location::caller());
        let embed = action.embedder();
        Reducer::new(move |global, global_action, global_env| {
            let Some(local_action) = action.extract(global_action) else {
                return Effect::none();
            };
            let Some(local) = state.extract_mut(global) else {
                Diagnostics::current().report(Diagnostic::UnavailableState {
                    reducer: reducer.clone(),
                    action: embed(local_action).label(),
                });
                return Effect::none();
            };
            let local_env = environment(global_env);
            let embed = Arc::clone(&embed);
            self.run(local, local_action, &local_env)
                .map(move |local| embed(local))
        })
    }

    /// Lift this reducer to `Option<S>`. Actions arriving while the state is
    /// `None` are dropped and reported as [`Diagnostic::UnavailableState`].
    #[track_caller]
    pub fn optional(self) -> Reducer<Option<S>, A, E>
    where
        A: Action,
    {
        let reducer = reducer_label(Location::caller());
        Reducer::new(move |state: &mut Option<S>, action: A, environment| {
            let Some(state) = state.as_mut() else {
                Diagnostics::current().report(Diagnostic::UnavailableState {
                    reducer: reducer.clone(),
                    action: action.label(),
                });
                return Effect::none();
            };
            self.run(state, action, environment)
        })
    }
}
