//! Runtime diagnostics: logic errors, unhandled effect failures and
//! threading violations.
//!
//! None of these ever terminate the host. A diagnostic is logged with
//! `tracing`, kept in a bounded history, forwarded to any hooks, and only in
//! [`DiagnosticMode::Strict`] turned into a panic so tests fail loudly.
//!
//! Strict failures raised off a store's owner thread (inside a tokio task,
//! say) do not panic there. The first one is held and raised on the owner
//! thread by the next [`Store::send`](crate::Store::send), or by
//! [`Diagnostics::assert_clean`].

mod thread_check;

pub(crate) use thread_check::ThreadCheck;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::config::DiagnosticsConfig;

/// A non-fatal problem detected at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// An action reached a case/optional reducer while its state was absent.
    #[error(
        "\"{action}\" was received by {reducer} when its state was unavailable; \
         the action was dropped"
    )]
    UnavailableState { reducer: String, action: String },

    /// An action reached a keyed-collection reducer for a key with no element.
    #[error(
        "\"{action}\" was received by {reducer} at key {key} when the collection \
         contained no element at this key; the action was dropped"
    )]
    MissingElement {
        reducer: String,
        key: String,
        action: String,
    },

    /// An async effect failed and no error handler was supplied.
    #[error("an effect failed with an unhandled error: {error}")]
    UnhandledEffectError { error: String },

    /// A store was used from a thread other than the one that owns it.
    #[error(
        "{operation} was called on thread {thread}, but the store is owned by another \
         thread; create the store with Store::unchecked to disable this check"
    )]
    ThreadViolation { operation: String, thread: String },

    /// An async effect was subscribed with no tokio runtime available.
    #[error("an async effect was started outside of a tokio runtime and was skipped")]
    MissingRuntime,
}

/// How reported diagnostics are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticMode {
    /// Log and record.
    #[default]
    Log,
    /// Log, record, then panic.
    Strict,
}

type Hook = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Shared diagnostics sink.
#[derive(Clone)]
pub struct Diagnostics {
    inner: Arc<DiagnosticsInner>,
}

struct DiagnosticsInner {
    mode: DiagnosticMode,
    capacity: usize,
    history: Mutex<VecDeque<Diagnostic>>,
    hooks: RwLock<Vec<Hook>>,
    /// First strict failure reported off the owner thread.
    deferred: Mutex<Option<Diagnostic>>,
}

pub const DEFAULT_HISTORY: usize = 64;

thread_local! {
    static CURRENT: RefCell<Option<Diagnostics>> = const { RefCell::new(None) };
}

static PROCESS_DEFAULT: OnceLock<Diagnostics> = OnceLock::new();

impl Diagnostics {
    pub fn new(mode: DiagnosticMode) -> Self {
        Self::with_capacity(mode, DEFAULT_HISTORY)
    }

    pub fn with_capacity(mode: DiagnosticMode, capacity: usize) -> Self {
        Self {
            inner: Arc::new(DiagnosticsInner {
                mode,
                capacity: capacity.max(1),
                history: Mutex::new(VecDeque::new()),
                hooks: RwLock::new(Vec::new()),
                deferred: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        Self::with_capacity(config.mode, config.history)
    }

    /// Builder form of [`add_hook`](Self::add_hook).
    pub fn with_hook(self, hook: impl Fn(&Diagnostic) + Send + Sync + 'static) -> Self {
        self.add_hook(hook);
        self
    }

    /// Call `hook` for every diagnostic reported from now on, through this
    /// handle or any clone of it.
    pub fn add_hook(&self, hook: impl Fn(&Diagnostic) + Send + Sync + 'static) {
        self.inner.hooks.write().push(Arc::new(hook));
    }

    pub fn mode(&self) -> DiagnosticMode {
        self.inner.mode
    }

    /// Report a diagnostic.
    ///
    /// # Panics
    /// In [`DiagnosticMode::Strict`], after logging and recording.
    pub fn report(&self, diagnostic: Diagnostic) {
        self.record(&diagnostic);
        if self.inner.mode == DiagnosticMode::Strict {
            panic!("{diagnostic}");
        }
    }

    /// Report from a thread that does not own the store. In strict mode the
    /// panic is held for the owner thread instead of unwinding here.
    pub(crate) fn report_deferred(&self, diagnostic: Diagnostic) {
        self.record(&diagnostic);
        if self.inner.mode == DiagnosticMode::Strict {
            self.inner.deferred.lock().get_or_insert(diagnostic);
        }
    }

    fn record(&self, diagnostic: &Diagnostic) {
        tracing::warn!(diagnostic = %diagnostic, "runtime warning");

        {
            let mut history = self.inner.history.lock();
            if history.len() == self.inner.capacity {
                history.pop_front();
            }
            history.push_back(diagnostic.clone());
        }

        // Hooks may add hooks.
        let hooks = self.inner.hooks.read().clone();
        for hook in &hooks {
            hook(diagnostic);
        }
    }

    /// Raise a held strict failure, if any.
    ///
    /// # Panics
    /// With the first strict diagnostic reported off the owner thread since
    /// the last call.
    pub fn assert_clean(&self) {
        let deferred = self.inner.deferred.lock().take();
        if let Some(diagnostic) = deferred {
            panic!("{diagnostic}");
        }
    }

    /// Most recent diagnostics, oldest first.
    pub fn history(&self) -> Vec<Diagnostic> {
        self.inner.history.lock().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.inner.history.lock().clear();
    }

    /// The sink of the store currently draining on this thread, or the
    /// process default outside of any drain.
    pub fn current() -> Diagnostics {
        CURRENT
            .with(|current| current.borrow().clone())
            .unwrap_or_else(Self::process_default)
    }

    /// Log-only sink used when no store is active.
    pub fn process_default() -> Diagnostics {
        PROCESS_DEFAULT
            .get_or_init(|| Diagnostics::new(DiagnosticMode::Log))
            .clone()
    }

    /// Make this sink current on this thread until the guard drops.
    pub(crate) fn enter(&self) -> CurrentDiagnostics {
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        CurrentDiagnostics { previous }
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(DiagnosticMode::Log)
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("mode", &self.inner.mode)
            .field("recorded", &self.inner.history.lock().len())
            .finish()
    }
}

/// Restores the previously current sink on drop.
pub(crate) struct CurrentDiagnostics {
    previous: Option<Diagnostics>,
}

impl Drop for CurrentDiagnostics {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}
