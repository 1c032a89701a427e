use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lockdown_runtime::process::ClientProcess;

#[test]
fn only_first_exit_is_reported() {
    let process = ClientProcess::new(Some(42));
    let raised = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&raised);
    process.terminated().subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(!process.has_exited());
    process.mark_exited(3);
    process.mark_exited(0);

    assert_eq!(raised.load(Ordering::SeqCst), 1);
    assert_eq!(process.exit_code(), Some(3));
    assert_eq!(process.id(), Some(42));
}

#[tokio::test]
async fn wait_for_exit_times_out_while_running() {
    let process = ClientProcess::new(None);
    assert_eq!(process.wait_for_exit(Duration::from_millis(20)).await, None);
}

#[tokio::test]
async fn exited_resolves_after_mark() {
    let process = Arc::new(ClientProcess::new(None));
    let marker = Arc::clone(&process);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        marker.mark_exited(7);
    });

    assert_eq!(process.exited().await, 7);
    assert!(process.terminate(Duration::from_millis(10)).await);
}

#[cfg(unix)]
#[tokio::test]
async fn spawned_process_reports_exit_code() {
    let mut command = tokio::process::Command::new("sh");
    command.args(["-c", "exit 3"]);
    let process = ClientProcess::spawn(command).unwrap();

    assert_eq!(
        process.wait_for_exit(Duration::from_secs(5)).await,
        Some(3)
    );
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_stops_long_running_process() {
    let mut command = tokio::process::Command::new("sleep");
    command.arg("30");
    let process = ClientProcess::spawn(command).unwrap();

    assert!(process.terminate(Duration::from_secs(5)).await);
    assert!(process.has_exited());
}

#[test]
fn spawn_of_missing_executable_fails() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let command = tokio::process::Command::new("/nonexistent/lockdown-client");
    let err = ClientProcess::spawn(command).unwrap_err();
    assert!(err.to_string().starts_with("process: failed to spawn client"));
}
