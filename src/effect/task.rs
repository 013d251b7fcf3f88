//! Async task effects.
//!
//! A task effect runs its operation on the current tokio runtime. The
//! operation receives an [`ActionSender`] to push actions and to observe
//! cancellation. Disposal flags the task as cancelled, wakes anything waiting
//! in [`ActionSender::cancelled`], and aborts the tokio task.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::Instrument;

use super::disposable::Disposable;
use super::sink::Sink;
use crate::diagnostics::{Diagnostic, Diagnostics};

/// Scheduling hint for a task effect.
///
/// tokio has no task priorities; the value is recorded on the task's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPriority {
    High,
    UserInitiated,
    #[default]
    Medium,
    Low,
    Utility,
    Background,
}

/// Marker error for cooperative cancellation.
///
/// An operation that fails with `Cancelled` (directly or as the root cause of
/// an `anyhow::Error`) terminates silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("effect cancelled")]
pub struct Cancelled;

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub(crate) type Operation<A> = Box<dyn FnOnce(ActionSender<A>) -> BoxFuture + Send>;
pub(crate) type ErrorHandler<A> = Box<dyn FnOnce(anyhow::Error, ActionSender<A>) + Send>;

/// Cancellation flag shared between a task and its disposer.
#[derive(Clone)]
struct CancelSignal {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        // Register interest before checking the flag so a cancel between the
        // check and the await is not lost.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Handle given to a task operation for delivering actions.
///
/// After cancellation, sent actions are dropped.
pub struct ActionSender<A> {
    sink: Sink<A>,
    signal: CancelSignal,
}

impl<A> Clone for ActionSender<A> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            signal: self.signal.clone(),
        }
    }
}

impl<A: Send + 'static> ActionSender<A> {
    pub fn send(&self, action: A) {
        if self.signal.is_cancelled() {
            return;
        }
        self.sink.send(action);
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// `Err(Cancelled)` once the task has been cancelled, for use with `?`.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the task is cancelled.
    pub async fn cancelled(&self) {
        self.signal.wait().await
    }

    pub(crate) fn contramap<B: Send + 'static>(
        &self,
        transform: impl Fn(B) -> A + Send + Sync + 'static,
    ) -> ActionSender<B> {
        ActionSender {
            sink: self.sink.contramap(transform),
            signal: self.signal.clone(),
        }
    }
}

/// True when `error` is, or was caused by, [`Cancelled`].
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<Cancelled>())
}

/// The not-yet-started form of a task effect.
pub(crate) struct Task<A> {
    pub(crate) priority: TaskPriority,
    pub(crate) operation: Operation<A>,
    pub(crate) handler: Option<ErrorHandler<A>>,
}

impl<A: Send + 'static> Task<A> {
    pub(crate) fn map<B: Send + 'static>(
        self,
        transform: Arc<dyn Fn(A) -> B + Send + Sync>,
    ) -> Task<B> {
        let Task {
            priority,
            operation,
            handler,
        } = self;
        let op_transform = Arc::clone(&transform);
        let operation: Operation<B> = Box::new(move |sender: ActionSender<B>| {
            operation(sender.contramap(move |action| op_transform(action)))
        });
        let handler = handler.map(|handler| -> ErrorHandler<B> {
            Box::new(move |error: anyhow::Error, sender: ActionSender<B>| {
                handler(error, sender.contramap(move |action| transform(action)))
            })
        });
        Task {
            priority,
            operation,
            handler,
        }
    }

    /// Spawn the operation on the current runtime.
    pub(crate) fn start(self, sink: Sink<A>) -> Disposable {
        let diagnostics = Diagnostics::current();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            diagnostics.report(Diagnostic::MissingRuntime);
            sink.complete();
            return Disposable::empty();
        };

        let Task {
            priority,
            operation,
            handler,
        } = self;
        let signal = CancelSignal::new();
        let sender = ActionSender {
            sink: sink.clone(),
            signal: signal.clone(),
        };
        let span = tracing::debug_span!("effect_task", priority = ?priority);
        let finished = signal.clone();

        let join = runtime.spawn(
            async move {
                // Completes on every exit, a panicking operation or handler
                // included. A disposed task stays silent.
                let _complete = scopeguard::guard(sink, move |sink| {
                    if !finished.is_cancelled() {
                        sink.complete();
                    }
                });
                if sender.is_cancelled() {
                    return;
                }
                if let Err(error) = operation(sender.clone()).await {
                    if is_cancellation(&error) || sender.is_cancelled() {
                        tracing::trace!("task effect cancelled");
                    } else if let Some(handler) = handler {
                        handler(error, sender.clone());
                    } else {
                        diagnostics.report_deferred(Diagnostic::UnhandledEffectError {
                            error: format!("{error:#}"),
                        });
                    }
                }
            }
            .instrument(span),
        );

        Disposable::new(move || {
            signal.cancel();
            join.abort();
        })
    }
}
