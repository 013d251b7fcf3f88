mod common;

use common::recording_sink;
use std::sync::atomic::Ordering;
use std::time::Duration;
use unistore::effect::TaskPriority;
use unistore::{
    Action, Diagnostic, DiagnosticMode, Diagnostics, Effect, Reducer, Store, StoreOptions,
    TestScheduler,
};

#[test]
fn merge_delivers_every_child_once() {
    let scheduler = TestScheduler::new();
    let (sink, values, completed) = recording_sink();
    let _running = Effect::merge([
        Effect::send(1).deferred(Duration::from_secs(2), scheduler.shared()),
        Effect::send(2).deferred(Duration::from_secs(1), scheduler.shared()),
        Effect::send(3),
    ])
    .subscribe(sink);

    assert_eq!(values.values(), vec![3]);
    assert!(!completed.load(Ordering::SeqCst));
    scheduler.run();
    let mut delivered = values.values();
    delivered.sort_unstable();
    assert_eq!(delivered, vec![1, 2, 3]);
    assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn concatenate_starts_each_child_after_the_previous_finishes() {
    let scheduler = TestScheduler::new();
    let (sink, values, completed) = recording_sink();
    let _running = Effect::concatenate([
        Effect::send("slow").deferred(Duration::from_secs(3), scheduler.shared()),
        Effect::send("fast").deferred(Duration::from_secs(1), scheduler.shared()),
        Effect::send("last"),
    ])
    .subscribe(sink);

    scheduler.advance(Duration::from_secs(3));
    assert_eq!(values.values(), vec!["slow"]);
    scheduler.advance(Duration::from_secs(1));
    assert_eq!(values.values(), vec!["slow", "fast", "last"]);
    assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn none_children_are_skipped() {
    let effect = Effect::<i32>::concatenate([Effect::none(), Effect::none()]);
    assert!(effect.is_none());
    assert!(Effect::<i32>::from_iter(Vec::new()).is_none());
    assert!(!Effect::merge([Effect::none(), Effect::send(1)]).is_none());
}

#[test]
fn map_transforms_every_emission() {
    let (sink, values, completed) = recording_sink();
    let _running = Effect::from_iter([1, 2, 3])
        .map(|n| format!("#{n}"))
        .subscribe(sink);
    assert_eq!(values.values(), vec!["#1", "#2", "#3"]);
    assert!(completed.load(Ordering::SeqCst));
}

#[test]
fn fire_and_forget_runs_at_subscription() {
    let ran = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = ran.clone();
    let effect = Effect::<()>::fire_and_forget(move || flag.store(true, Ordering::SeqCst));
    assert!(!ran.load(Ordering::SeqCst));

    let (sink, values, completed) = recording_sink();
    let _running = effect.subscribe(sink);
    assert!(ran.load(Ordering::SeqCst));
    assert!(values.values().is_empty());
    assert!(completed.load(Ordering::SeqCst));
}

#[derive(Debug, Clone, PartialEq)]
enum Job {
    Attempt(bool),
    Done(u8),
    Failed(String),
}

impl Action for Job {}

fn job_store(diagnostics: Diagnostics) -> Store<Vec<Job>, Job> {
    let reducer = Reducer::<Vec<Job>, Job>::new(|log, action, _| {
        log.push(action.clone());
        match action {
            Job::Attempt(ok) => Effect::result(move || {
                if ok {
                    Ok(Job::Done(1))
                } else {
                    Err(anyhow::anyhow!("disk full"))
                }
            }),
            _ => Effect::none(),
        }
    });
    Store::with_options(
        Vec::new(),
        reducer,
        (),
        StoreOptions {
            thread_checks: true,
            diagnostics,
        },
    )
}

#[test]
fn failed_results_become_diagnostics() {
    let diagnostics = Diagnostics::new(DiagnosticMode::Log);
    let store = job_store(diagnostics.clone());

    store.send(Job::Attempt(true));
    store.send(Job::Attempt(false));
    assert_eq!(
        store.state(),
        vec![Job::Attempt(true), Job::Done(1), Job::Attempt(false)]
    );
    assert_eq!(
        diagnostics.history(),
        vec![Diagnostic::UnhandledEffectError {
            error: "disk full".into()
        }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_failures_go_to_the_handler() {
    let (sink, values, completed) = recording_sink();
    let _running = Effect::run_catching(
        TaskPriority::Background,
        |sender| async move {
            sender.send(Job::Done(0));
            Err::<(), _>(anyhow::anyhow!("upstream timed out"))
        },
        |error, sender| sender.send(Job::Failed(error.to_string())),
    )
    .subscribe(sink);

    assert!(
        common::wait_until(Duration::from_secs(2), || completed.load(Ordering::SeqCst)).await
    );
    assert_eq!(
        values.values(),
        vec![Job::Done(0), Job::Failed("upstream timed out".into())]
    );
}

#[tokio::test]
async fn task_output_is_emitted() {
    let (sink, values, completed) = recording_sink();
    let _running = Effect::task(|| async { 7_u8 }).map(Job::Done).subscribe(sink);
    assert!(
        common::wait_until(Duration::from_secs(2), || completed.load(Ordering::SeqCst)).await
    );
    assert_eq!(values.values(), vec![Job::Done(7)]);
}

#[test]
fn tasks_without_a_runtime_are_reported() {
    let diagnostics = Diagnostics::new(DiagnosticMode::Log);
    let reducer = Reducer::<u8, Job>::new(|_, action, _| match action {
        Job::Attempt(_) => Effect::task(|| async { Job::Done(2) }),
        _ => Effect::none(),
    });
    let store = Store::with_options(
        0,
        reducer,
        (),
        StoreOptions {
            thread_checks: true,
            diagnostics: diagnostics.clone(),
        },
    );

    store.send(Job::Attempt(true));
    assert_eq!(diagnostics.history(), vec![Diagnostic::MissingRuntime]);
    assert_eq!(store.live_effect_count(), 0);
}
