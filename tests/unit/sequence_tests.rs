//! Unit tests for `OperationSequence` ordering, rollback and repeat rules.

use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt};
use lockdown_runtime::operations::{
    Operation, OperationContext, OperationResult, OperationSequence, ProgressChanged,
    SequenceObserver,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Step {
    name: &'static str,
    log: Log,
    perform: OperationResult,
    revert: OperationResult,
    repeat: Option<OperationResult>,
}

impl Step {
    fn ok(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            perform: OperationResult::Success,
            revert: OperationResult::Success,
            repeat: None,
        })
    }

    fn with(
        name: &'static str,
        log: &Log,
        perform: OperationResult,
        revert: OperationResult,
        repeat: Option<OperationResult>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: Arc::clone(log),
            perform,
            revert,
            repeat,
        })
    }

    fn record(&self, action: &str) {
        self.log.lock().unwrap().push(format!("{action} {}", self.name));
    }
}

impl Operation for Step {
    fn name(&self) -> &'static str {
        self.name
    }

    fn perform<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            self.record("perform");
            self.perform
        }
        .boxed()
    }

    fn revert<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            self.record("revert");
            self.revert
        }
        .boxed()
    }

    fn is_repeatable(&self) -> bool {
        self.repeat.is_some()
    }

    fn repeat<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            self.record("repeat");
            self.repeat.unwrap_or(OperationResult::Success)
        }
        .boxed()
    }
}

#[derive(Default)]
struct ProgressLog(Mutex<Vec<ProgressChanged>>);

impl SequenceObserver for ProgressLog {
    fn progress_changed(&self, progress: ProgressChanged) {
        self.0.lock().unwrap().push(progress);
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn ops(steps: Vec<Arc<Step>>) -> Vec<Arc<dyn Operation>> {
    steps.into_iter().map(|step| step as Arc<dyn Operation>).collect()
}

#[tokio::test]
async fn perform_runs_in_order_and_revert_in_reverse() {
    let log = Log::default();
    let sequence = OperationSequence::new(ops(vec![
        Step::ok("a", &log),
        Step::ok("b", &log),
        Step::ok("c", &log),
    ]));

    assert_eq!(sequence.try_perform().await, OperationResult::Success);
    assert_eq!(sequence.performed_count(), 3);
    assert_eq!(sequence.try_revert().await, OperationResult::Success);
    assert_eq!(sequence.performed_count(), 0);

    assert_eq!(
        entries(&log),
        vec!["perform a", "perform b", "perform c", "revert c", "revert b", "revert a"]
    );
}

#[tokio::test]
async fn failing_step_rolls_back_completed_steps_only() {
    let log = Log::default();
    let sequence = OperationSequence::new(ops(vec![
        Step::ok("a", &log),
        Step::ok("b", &log),
        Step::with("c", &log, OperationResult::Failed, OperationResult::Success, None),
        Step::ok("d", &log),
    ]));

    assert_eq!(sequence.try_perform().await, OperationResult::Failed);
    assert_eq!(
        entries(&log),
        vec!["perform a", "perform b", "perform c", "revert b", "revert a"]
    );
    assert_eq!(sequence.performed_count(), 0);
}

#[tokio::test]
async fn aborted_step_propagates_abort() {
    let log = Log::default();
    let sequence = OperationSequence::new(ops(vec![
        Step::ok("a", &log),
        Step::with("b", &log, OperationResult::Aborted, OperationResult::Success, None),
    ]));

    assert_eq!(sequence.try_perform().await, OperationResult::Aborted);
    assert_eq!(entries(&log), vec!["perform a", "perform b", "revert a"]);
}

#[tokio::test]
async fn revert_continues_past_failures() {
    let log = Log::default();
    let sequence = OperationSequence::new(ops(vec![
        Step::ok("a", &log),
        Step::with("b", &log, OperationResult::Success, OperationResult::Failed, None),
        Step::ok("c", &log),
    ]));

    assert!(sequence.try_perform().await.is_success());
    assert_eq!(sequence.try_revert().await, OperationResult::Failed);
    assert_eq!(
        entries(&log)[3..],
        ["revert c", "revert b", "revert a"]
    );
}

#[tokio::test]
async fn revert_of_empty_sequence_succeeds() {
    let sequence = OperationSequence::new(Vec::new());
    assert_eq!(sequence.try_revert().await, OperationResult::Success);
}

#[tokio::test]
async fn repeat_on_plain_sequence_fails_without_side_effects() {
    let log = Log::default();
    let sequence = OperationSequence::new(ops(vec![Step::with(
        "a",
        &log,
        OperationResult::Success,
        OperationResult::Success,
        Some(OperationResult::Success),
    )]));

    assert!(!sequence.is_repeatable());
    assert_eq!(sequence.try_repeat().await, OperationResult::Failed);
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn repeat_touches_only_repeatable_steps() {
    let log = Log::default();
    let sequence = OperationSequence::repeatable(ops(vec![
        Step::ok("fixed", &log),
        Step::with(
            "again",
            &log,
            OperationResult::Success,
            OperationResult::Success,
            Some(OperationResult::Success),
        ),
    ]));

    assert!(sequence.try_perform().await.is_success());
    assert!(sequence.try_repeat().await.is_success());
    assert_eq!(sequence.performed_count(), 2);
    assert_eq!(
        entries(&log),
        vec!["perform fixed", "perform again", "repeat again"]
    );
}

#[tokio::test]
async fn failed_repeat_reverts_whole_sequence() {
    let log = Log::default();
    let sequence = OperationSequence::repeatable(ops(vec![
        Step::with(
            "a",
            &log,
            OperationResult::Success,
            OperationResult::Success,
            Some(OperationResult::Success),
        ),
        Step::with(
            "b",
            &log,
            OperationResult::Success,
            OperationResult::Success,
            Some(OperationResult::Failed),
        ),
    ]));

    assert!(sequence.try_perform().await.is_success());
    assert_eq!(sequence.try_repeat().await, OperationResult::Failed);
    assert_eq!(sequence.performed_count(), 0);
    assert_eq!(
        entries(&log),
        vec!["perform a", "perform b", "repeat a", "repeat b", "revert b", "revert a"]
    );
}

#[tokio::test]
async fn repeat_after_revert_pushes_steps_again() {
    let log = Log::default();
    let sequence = OperationSequence::repeatable(ops(vec![Step::with(
        "a",
        &log,
        OperationResult::Success,
        OperationResult::Success,
        Some(OperationResult::Success),
    )]));

    assert!(sequence.try_perform().await.is_success());
    assert!(sequence.try_revert().await.is_success());
    assert!(sequence.try_repeat().await.is_success());
    assert_eq!(sequence.performed_count(), 1);
}

#[tokio::test]
async fn progress_is_reported_per_step() {
    let log = Log::default();
    let observer = Arc::new(ProgressLog::default());
    let sequence = OperationSequence::new(ops(vec![
        Step::ok("a", &log),
        Step::with("b", &log, OperationResult::Failed, OperationResult::Success, None),
    ]));
    sequence.subscribe(observer.clone());

    sequence.try_perform().await;

    assert_eq!(
        *observer.0.lock().unwrap(),
        vec![
            ProgressChanged::MaxValue(2),
            ProgressChanged::Value(0),
            ProgressChanged::Increment,
            ProgressChanged::Decrement,
        ]
    );
}

#[tokio::test]
async fn unsubscribed_observer_is_not_notified() {
    let observer = Arc::new(ProgressLog::default());
    let sequence = OperationSequence::new(Vec::new());
    let id = sequence.subscribe(observer.clone());

    assert!(sequence.unsubscribe(id));
    assert!(!sequence.unsubscribe(id));
    sequence.try_perform().await;

    assert!(observer.0.lock().unwrap().is_empty());
}
