//! Owner-thread checks for stores.

use std::thread::{self, ThreadId};

use super::{Diagnostic, Diagnostics};

/// Remembers the thread a store was created on.
#[derive(Debug, Clone)]
pub(crate) struct ThreadCheck {
    owner: ThreadId,
    enabled: bool,
}

impl ThreadCheck {
    /// Capture the calling thread as owner.
    pub(crate) fn capture(enabled: bool) -> Self {
        Self {
            owner: thread::current().id(),
            enabled,
        }
    }

    pub(crate) fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Report a [`Diagnostic::ThreadViolation`] when called off the owner thread.
    /// `operation` is only rendered when a violation happens. In strict mode
    /// the panic is held for the owner thread.
    pub(crate) fn verify(&self, diagnostics: &Diagnostics, operation: impl FnOnce() -> String) {
        if !self.enabled || self.is_owner() {
            return;
        }
        let current = thread::current();
        let thread = current
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", current.id()));
        diagnostics.report_deferred(Diagnostic::ThreadViolation {
            operation: operation(),
            thread,
        });
    }
}
