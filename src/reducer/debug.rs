//! Debug logging of received actions.

use super::{Action, Reducer};

impl<S, A, E> Reducer<S, A, E>
where
    S: Clone + PartialEq + 'static,
    A: Action,
    E: 'static,
{
    /// Log every action this reducer receives at `debug` level, with
    /// whether it changed the state. Does nothing when `debug` is disabled.
    pub fn debug_actions(self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Reducer::new(move |state, action, environment| {
            if !tracing::enabled!(tracing::Level::DEBUG) {
                return self.run(state, action, environment);
            }
            let label = action.label();
            let before = state.clone();
            let effect = self.run(state, action, environment);
            let changed = before != *state;
            tracing::debug!(prefix = %prefix, action = %label, changed, "received action");
            effect
        })
    }
}
