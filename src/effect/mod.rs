//! Effects: lazy, cancellable descriptions of work that produce actions.
//!
//! An [`Effect`] does nothing until it is subscribed. Subscribing hands it a
//! [`Sink`] and returns a [`Disposable`] that cancels the work. Effects are
//! plain values: `map`, `merge` and `concatenate` build new effects without
//! running anything.
//!
//! ```text
//! reducer ──→ Effect ──subscribe──→ running work ──actions──→ Store::send
//!                                        ↑
//!                       Disposable ──────┘ (cancel / teardown)
//! ```

mod compose;
pub mod disposable;
pub mod sink;
pub mod task;
mod timing;

pub use disposable::{CompositeDisposable, Disposable, DisposeKey, SerialDisposable};
pub use sink::{Event, Sink};
pub use task::{is_cancellation, ActionSender, Cancelled, TaskPriority};

use std::future::Future;
use std::sync::Arc;

use crate::diagnostics::{Diagnostic, Diagnostics};
use task::{BoxFuture, ErrorHandler, Operation, Task};

type Producer<A> = Box<dyn FnOnce(Sink<A>) -> Disposable + Send>;

/// A unit of work producing zero or more actions and then terminating.
#[must_use = "effects do nothing unless returned to a store or subscribed"]
pub struct Effect<A> {
    kind: EffectKind<A>,
}

enum EffectKind<A> {
    None,
    Producer(Producer<A>),
    Task(Task<A>),
}

impl<A> std::fmt::Debug for Effect<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            EffectKind::None => "none",
            EffectKind::Producer(_) => "producer",
            EffectKind::Task(_) => "task",
        };
        f.debug_struct("Effect").field("kind", &kind).finish()
    }
}

impl<A: Send + 'static> Default for Effect<A> {
    fn default() -> Self {
        Self::none()
    }
}

impl<A: Send + 'static> Effect<A> {
    /// Completes immediately without emitting.
    pub fn none() -> Self {
        Self {
            kind: EffectKind::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, EffectKind::None)
    }

    /// Emits `action` once, then completes.
    pub fn send(action: A) -> Self {
        Self::publisher(move |sink| {
            sink.send(action);
            sink.complete();
            Disposable::empty()
        })
    }

    /// Emits every action of `actions` in order, then completes.
    pub fn from_iter(actions: impl IntoIterator<Item = A>) -> Self {
        let actions: Vec<A> = actions.into_iter().collect();
        if actions.is_empty() {
            return Self::none();
        }
        Self::publisher(move |sink| {
            for action in actions {
                sink.send(action);
            }
            sink.complete();
            Disposable::empty()
        })
    }

    /// An effect from a raw producer.
    ///
    /// `subscribe` runs once per subscription; it must eventually call
    /// [`Sink::complete`] and return a handle that stops the work.
    pub fn publisher(subscribe: impl FnOnce(Sink<A>) -> Disposable + Send + 'static) -> Self {
        Self {
            kind: EffectKind::Producer(Box::new(subscribe)),
        }
    }

    /// Runs `work` at subscription and completes without emitting.
    pub fn fire_and_forget(work: impl FnOnce() + Send + 'static) -> Self {
        Self::publisher(move |sink| {
            work();
            sink.complete();
            Disposable::empty()
        })
    }

    /// Bridges a callback-style API.
    ///
    /// `attempt` receives a one-shot callback. `Ok` emits and completes; `Err`
    /// is reported as a diagnostic (unless it is a cancellation) and completes.
    pub fn future(
        attempt: impl FnOnce(Box<dyn FnOnce(anyhow::Result<A>) + Send>) + Send + 'static,
    ) -> Self {
        Self::publisher(move |sink| {
            let diagnostics = Diagnostics::current();
            let (guarded, close) = sink.guarded();
            attempt(Box::new(move |result: anyhow::Result<A>| {
                match result {
                    Ok(action) => guarded.send(action),
                    Err(error) => report_failure(&diagnostics, error),
                }
                guarded.complete();
            }));
            close
        })
    }

    /// Evaluates `attempt` at subscription.
    pub fn result(attempt: impl FnOnce() -> anyhow::Result<A> + Send + 'static) -> Self {
        Self::future(move |callback| callback(attempt()))
    }

    /// Runs `operation` as a tokio task with default priority.
    ///
    /// Failures are reported as diagnostics; [`Cancelled`] failures are silent.
    pub fn run<F, Fut>(operation: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::run_with_priority(TaskPriority::default(), operation)
    }

    pub fn run_with_priority<F, Fut>(priority: TaskPriority, operation: F) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::task_effect(priority, operation, None)
    }

    /// Like [`run_with_priority`](Self::run_with_priority), with failures
    /// handed to `handler` instead of becoming diagnostics.
    pub fn run_catching<F, Fut, H>(priority: TaskPriority, operation: F, handler: H) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        H: FnOnce(anyhow::Error, ActionSender<A>) + Send + 'static,
    {
        Self::task_effect(priority, operation, Some(Box::new(handler)))
    }

    /// Runs an async computation and emits its output.
    pub fn task<F, Fut>(operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = A> + Send + 'static,
    {
        Self::run(move |sender| async move {
            let action = operation().await;
            sender.check_cancelled()?;
            sender.send(action);
            anyhow::Ok(())
        })
    }

    fn task_effect<F, Fut>(
        priority: TaskPriority,
        operation: F,
        handler: Option<ErrorHandler<A>>,
    ) -> Self
    where
        F: FnOnce(ActionSender<A>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let operation: Operation<A> =
            Box::new(move |sender: ActionSender<A>| -> BoxFuture { Box::pin(operation(sender)) });
        Self {
            kind: EffectKind::Task(Task {
                priority,
                operation,
                handler,
            }),
        }
    }

    /// Start the effect.
    pub fn subscribe(self, sink: Sink<A>) -> Disposable {
        match self.kind {
            EffectKind::None => {
                sink.complete();
                Disposable::empty()
            }
            EffectKind::Producer(subscribe) => subscribe(sink),
            EffectKind::Task(task) => task.start(sink),
        }
    }

    /// Transform every emitted action. Cancellation passes through unchanged.
    pub fn map<B: Send + 'static>(self, transform: impl Fn(A) -> B + Send + Sync + 'static) -> Effect<B> {
        match self.kind {
            EffectKind::None => Effect::none(),
            EffectKind::Producer(subscribe) => {
                Effect::publisher(move |sink: Sink<B>| subscribe(sink.contramap(transform)))
            }
            EffectKind::Task(task) => Effect {
                kind: EffectKind::Task(task.map(Arc::new(transform))),
            },
        }
    }

    /// Run all effects concurrently; completes when every one has completed.
    /// No ordering between their actions is guaranteed.
    pub fn merge(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        let mut effects: Vec<Effect<A>> =
            effects.into_iter().filter(|effect| !effect.is_none()).collect();
        match effects.len() {
            0 => Self::none(),
            1 => effects.remove(0),
            _ => Self::publisher(move |sink| compose::subscribe_merged(effects, sink)),
        }
    }

    /// Run effects one after another; each starts only after the previous one
    /// has terminated.
    pub fn concatenate(effects: impl IntoIterator<Item = Effect<A>>) -> Self {
        let mut effects: Vec<Effect<A>> =
            effects.into_iter().filter(|effect| !effect.is_none()).collect();
        match effects.len() {
            0 => Self::none(),
            1 => effects.remove(0),
            _ => Self::publisher(move |sink| compose::subscribe_concatenated(effects, sink)),
        }
    }

    pub fn merge_with(self, other: Effect<A>) -> Self {
        Self::merge([self, other])
    }

    pub fn concat_with(self, other: Effect<A>) -> Self {
        Self::concatenate([self, other])
    }
}

fn report_failure(diagnostics: &Diagnostics, error: anyhow::Error) {
    if is_cancellation(&error) {
        tracing::trace!("effect cancelled");
        return;
    }
    diagnostics.report(Diagnostic::UnhandledEffectError {
        error: format!("{error:#}"),
    });
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticMode;
    use parking_lot::Mutex;

    pub(crate) fn collect<A: Send + 'static>(effect: Effect<A>) -> (Vec<A>, bool) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(Mutex::new(false));
        let (v, d) = (values.clone(), done.clone());
        let _ = effect.subscribe(Sink::new(move |event| match event {
            Event::Next(value) => v.lock().push(value),
            Event::Completed => *d.lock() = true,
        }));
        let values = std::mem::take(&mut *values.lock());
        let done = *done.lock();
        (values, done)
    }

    #[test]
    fn none_completes_without_values() {
        let (values, done) = collect(Effect::<i32>::none());
        assert!(values.is_empty());
        assert!(done);
    }

    #[test]
    fn send_emits_once() {
        assert_eq!(collect(Effect::send(7)), (vec![7], true));
    }

    #[test]
    fn from_iter_keeps_order() {
        assert_eq!(collect(Effect::from_iter([1, 2, 3])), (vec![1, 2, 3], true));
    }

    #[test]
    fn map_transforms_values() {
        let effect = Effect::from_iter([1, 2]).map(|n| n * 10);
        assert_eq!(collect(effect), (vec![10, 20], true));
    }

    #[test]
    fn fire_and_forget_runs_work_lazily() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let effect = Effect::<i32>::fire_and_forget(move || *flag.lock() = true);
        assert!(!*ran.lock());
        assert_eq!(collect(effect), (vec![], true));
        assert!(*ran.lock());
    }

    #[test]
    fn result_failure_becomes_a_diagnostic() {
        let diagnostics = Diagnostics::new(DiagnosticMode::Log);
        let _current = diagnostics.enter();
        let effect = Effect::<i32>::result(|| Err(anyhow::anyhow!("disk full")));
        assert_eq!(collect(effect), (vec![], true));
        assert_eq!(
            diagnostics.history(),
            vec![Diagnostic::UnhandledEffectError {
                error: "disk full".into()
            }]
        );
    }

    #[test]
    fn cancelled_result_is_silent() {
        let diagnostics = Diagnostics::new(DiagnosticMode::Log);
        let _current = diagnostics.enter();
        let effect = Effect::<i32>::result(|| Err(Cancelled.into()));
        assert_eq!(collect(effect), (vec![], true));
        assert!(diagnostics.history().is_empty());
    }

    #[test]
    fn future_stops_delivering_after_dispose() {
        let callback = Arc::new(Mutex::new(None::<Box<dyn FnOnce(anyhow::Result<i32>) + Send>>));
        let slot = callback.clone();
        let effect = Effect::future(move |cb| *slot.lock() = Some(cb));

        let values = Arc::new(Mutex::new(Vec::new()));
        let v = values.clone();
        let disposable = effect.subscribe(Sink::new(move |event| {
            if let Event::Next(value) = event {
                v.lock().push(value);
            }
        }));
        disposable.dispose();
        let cb = callback.lock().take().unwrap();
        cb(Ok(1));
        assert!(values.lock().is_empty());
    }

    #[test]
    fn merging_only_none_is_none() {
        assert!(Effect::<i32>::merge([Effect::none(), Effect::none()]).is_none());
        assert!(Effect::<i32>::concatenate(Vec::new()).is_none());
    }
}
