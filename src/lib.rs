//! Unidirectional state management.
//!
//! A [`Store`] owns a state value and changes it only by running a
//! [`Reducer`] over the actions sent to it. Reducers return [`Effect`]s,
//! lazy units of work whose emitted actions are fed back into the store.
//! Effects can be cancelled by id through a [`CancellationRegistry`] and
//! timed against any [`Scheduler`].
//!
//! ```text
//!   view ──send──→ Store ──→ Reducer(state, action, env) ──→ Effect
//!    ↑               │                                         │
//!    └── ViewStore ←─┘ broadcast               actions ←───────┘
//! ```

pub mod cancellation;
pub mod config;
pub mod diagnostics;
pub mod effect;
pub mod logging;
pub mod reducer;
pub mod scheduler;
pub mod store;

pub use cancellation::{CancelId, CancelKey, CancellationRegistry};
pub use config::{Config, ConfigError};
pub use diagnostics::{Diagnostic, DiagnosticMode, Diagnostics};
pub use effect::{ActionSender, Disposable, Effect, Sink};
pub use reducer::{Action, CasePath, Lens, OptionalLens, Reducer, State};
pub use scheduler::{
    ImmediateScheduler, MainQueue, Scheduler, SharedScheduler, TestScheduler, TokioScheduler,
};
pub use store::{Binding, Store, StoreOptions, Subscription, ViewStore};
