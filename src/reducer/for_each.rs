//! Running an element reducer inside a keyed collection.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::Location;
use std::sync::Arc;

use indexmap::IndexMap;

use super::focus::reducer_label;
use super::{Action, CasePath, Lens, Reducer};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::effect::Effect;

/// Keyed collections an element reducer can run inside.
trait Elements<K, V> {
    fn element_mut(&mut self, key: &K) -> Option<&mut V>;
}

impl<K: Hash + Eq, V> Elements<K, V> for IndexMap<K, V> {
    fn element_mut(&mut self, key: &K) -> Option<&mut V> {
        self.get_mut(key)
    }
}

impl<K: Hash + Eq, V> Elements<K, V> for HashMap<K, V> {
    fn element_mut(&mut self, key: &K) -> Option<&mut V> {
        self.get_mut(key)
    }
}

impl<S: 'static, A: Send + 'static, E: 'static> Reducer<S, A, E> {
    /// Lift an element reducer to an ordered collection of elements.
    ///
    /// Parent actions carrying `(key, action)` run this reducer on the
    /// element at `key`. An action for a key with no element is dropped and
    /// reported as [`Diagnostic::MissingElement`].
    #[track_caller]
    pub fn for_each<GS, GA, GE, K>(
        self,
        elements: Lens<GS, IndexMap<K, S>>,
        action: CasePath<GA, (K, A)>,
        environment: impl Fn(&GE) -> E + Send + Sync + 'static,
    ) -> Reducer<GS, GA, GE>
    where
        GS: 'static,
        GA: Action,
        GE: 'static,
        K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    {
        lift_into(self, elements, action, environment, Location::caller())
    }

    /// [`for_each`](Self::for_each) over an unordered `HashMap`.
    #[track_caller]
    pub fn for_each_map<GS, GA, GE, K>(
        self,
        elements: Lens<GS, HashMap<K, S>>,
        action: CasePath<GA, (K, A)>,
        environment: impl Fn(&GE) -> E + Send + Sync + 'static,
    ) -> Reducer<GS, GA, GE>
    where
        GS: 'static,
        GA: Action,
        GE: 'static,
        K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    {
        lift_into(self, elements, action, environment, Location::caller())
    }
}

fn lift_into<S, A, E, GS, GA, GE, K, C>(
    element: Reducer<S, A, E>,
    elements: Lens<GS, C>,
    action: CasePath<GA, (K, A)>,
    environment: impl Fn(&GE) -> E + Send + Sync + 'static,
    location: &Location<'_>,
) -> Reducer<GS, GA, GE>
where
    S: 'static,
    A: Send + 'static,
    E: 'static,
    GS: 'static,
    GA: Action,
    GE: 'static,
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    C: Elements<K, S> + 'static,
{
    let reducer = reducer_label(location);
    let embed = action.embedder();
    Reducer::new(move |global, global_action, global_env| {
        let Some((key, local_action)) = action.extract(global_action) else {
            return Effect::none();
        };
        let Some(state) = elements.get_mut(global).element_mut(&key) else {
            Diagnostics::current().report(Diagnostic::MissingElement {
                reducer: reducer.clone(),
                key: format!("{key:?}"),
                action: embed((key, local_action)).label(),
            });
            return Effect::none();
        };
        let local_env = environment(global_env);
        let embed = Arc::clone(&embed);
        element
            .run(state, local_action, &local_env)
            .map(move |local| embed((key.clone(), local)))
    })
}
