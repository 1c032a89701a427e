use lockdown_runtime::ipc::protocol::RuntimeMessage;
use lockdown_runtime::registry::{ConfigurationMode, KioskMode, Settings};
use lockdown_runtime::runtime::{ControllerState, RuntimeEvent};
use lockdown_runtime::ui::{MessageBoxResult, TextKey};
use uuid::Uuid;

use super::test_helpers::{Harness, HarnessOptions};

fn exam_settings(kiosk_mode: KioskMode) -> Settings {
    Settings {
        kiosk_mode,
        configuration_mode: ConfigurationMode::Exam,
        ..Settings::default()
    }
}

fn reconfigure(path: &str) -> RuntimeMessage {
    RuntimeMessage::ReconfigurationRequested { path: path.into() }
}

#[tokio::test]
async fn startup_with_defaults_runs_a_session() {
    let harness = Harness::started(HarnessOptions::default()).await;

    assert_eq!(harness.controller.state(), ControllerState::SessionActive);
    assert!(harness.controller.is_session_running());
    assert!(!harness.controller.is_shutdown_requested());
    assert_eq!(harness.client.started(), 1);
    assert_eq!(harness.client.sessions(), vec![harness.session_id()]);
    assert!(harness.message_box.shown.lock().unwrap().is_empty());

    let window = harness.ui.runtime_window();
    assert!(window.is_visible());
    assert!(!window.is_topmost());
    assert!(harness.ui.splash_screens()[0].is_closed());
}

#[tokio::test]
async fn new_desktop_mode_keeps_window_on_top() {
    let harness = Harness::started(HarnessOptions {
        initial: Some(exam_settings(KioskMode::CreateNewDesktop)),
        ..HarnessOptions::default()
    })
    .await;

    let window = harness.ui.runtime_window();
    assert!(window.is_visible());
    assert!(window.is_topmost());
    assert!(harness.registry.current_session().unwrap().is_isolated());
    assert_eq!(harness.desktop.active().name, "LockdownDesktop");
}

#[tokio::test]
async fn disabled_shell_mode_hides_window() {
    let harness = Harness::started(HarnessOptions {
        initial: Some(exam_settings(KioskMode::DisableExplorerShell)),
        ..HarnessOptions::default()
    })
    .await;

    assert!(!harness.ui.runtime_window().is_visible());
    assert!(!harness.desktop.is_shell_running());
}

#[tokio::test]
async fn failed_bootstrap_reports_startup_error() {
    let mut harness = Harness::build(HarnessOptions {
        bootstrap_fails: true,
        ..HarnessOptions::default()
    });

    assert!(!harness.controller.try_start().await);
    assert_eq!(harness.controller.state(), ControllerState::Stopped);
    assert_eq!(harness.message_box.errors(), vec![TextKey::StartupErrorMessage]);
    assert_eq!(harness.client.started(), 0);
    assert!(harness.registry.current_session().is_none());
}

#[tokio::test]
async fn failed_initial_session_requests_shutdown() {
    let mut harness = Harness::build(HarnessOptions {
        service_unavailable: true,
        initial: Some(Settings {
            service_policy: lockdown_runtime::registry::ServicePolicy::Mandatory,
            ..exam_settings(KioskMode::None)
        }),
        ..HarnessOptions::default()
    });

    assert!(harness.controller.try_start().await);
    assert!(!harness.controller.is_session_running());
    assert!(harness.controller.is_shutdown_requested());
    assert_eq!(harness.message_box.errors(), vec![TextKey::SessionStartErrorMessage]);
    assert!(harness.registry.current_session().is_none());

    harness.controller.terminate().await;
    assert_eq!(
        *harness.bootstrap_log.lock().unwrap(),
        vec!["perform bootstrap", "revert bootstrap"]
    );
    assert_eq!(harness.controller.state(), ControllerState::Terminated);
}

#[tokio::test]
async fn client_that_never_reports_ready_fails_the_session() {
    let mut harness = Harness::build(HarnessOptions::default());
    harness.client.set_report_ready(false);

    assert!(harness.controller.try_start().await);
    assert!(!harness.controller.is_session_running());
    assert!(harness.controller.is_shutdown_requested());
    assert_eq!(harness.message_box.errors(), vec![TextKey::SessionStartErrorMessage]);
}

#[tokio::test]
async fn accepted_reconfiguration_starts_new_session() {
    let mut harness = Harness::started(HarnessOptions::default()).await;
    harness
        .settings
        .insert("/exam/next.lkd", exam_settings(KioskMode::None));
    let first_session = harness.session_id();
    let first_proxy = harness.client.last_proxy();

    let response = harness.client_sends(reconfigure("/exam/next.lkd")).await;

    assert!(response.ok);
    assert_eq!(harness.controller.state(), ControllerState::SessionActive);
    assert_ne!(harness.session_id(), first_session);
    assert_eq!(harness.client.started(), 2);
    assert!(first_proxy.calls().contains(&"initiate_shutdown".to_owned()));
    assert_eq!(
        harness.registry.settings().unwrap().configuration_mode,
        ConfigurationMode::Exam
    );
    assert!(harness.message_box.errors().is_empty());
    assert!(!harness.controller.is_shutdown_requested());
}

#[tokio::test]
async fn client_on_new_desktop_answers_settings_password_during_reconfiguration() {
    let mut harness = Harness::started(HarnessOptions {
        initial: Some(Settings {
            kiosk_mode: KioskMode::CreateNewDesktop,
            ..Settings::default()
        }),
        ..HarnessOptions::default()
    })
    .await;
    harness.settings.insert_protected(
        "/exam/protected.lkd",
        exam_settings(KioskMode::CreateNewDesktop),
        "secret",
    );
    let first_session = harness.session_id();
    let first_token = harness.registry.current_session().unwrap().startup_token;
    let first_proxy = harness.client.last_proxy();
    first_proxy.answer_passwords(&harness.host, Some("secret"), true);

    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        harness.client_sends(reconfigure("/exam/protected.lkd")),
    )
    .await
    .expect("reconfiguration completes");

    assert!(first_proxy
        .calls()
        .contains(&"request_password Settings".to_owned()));
    assert!(first_proxy.replies.lock().unwrap().iter().all(|response| response.ok));
    assert_eq!(harness.ui.dialog_count(), 0);
    assert_eq!(harness.controller.state(), ControllerState::SessionActive);
    assert_ne!(harness.session_id(), first_session);
    assert_eq!(harness.client.started(), 2);
    assert_eq!(
        harness.registry.settings().unwrap().configuration_mode,
        ConfigurationMode::Exam
    );
    assert!(harness.message_box.errors().is_empty());

    let stale = harness.host.dispatch(&super::test_helpers::request(
        first_token,
        RuntimeMessage::ShutdownRequested,
    ));
    assert!(!stale.ok);
}

#[tokio::test]
async fn old_client_exit_during_reconfiguration_is_ignored() {
    let mut harness = Harness::started(HarnessOptions::default()).await;
    harness
        .settings
        .insert("/exam/next.lkd", Settings::default());

    harness.client_sends(reconfigure("/exam/next.lkd")).await;
    let stale = harness.client.sessions()[0];
    harness
        .controller
        .handle_event(RuntimeEvent::ClientTerminated {
            session_id: stale,
            exit_code: 0,
        })
        .await;

    assert!(harness.controller.is_session_running());
    assert!(harness.message_box.errors().is_empty());
}

#[tokio::test]
async fn reconfiguration_in_exam_mode_is_denied() {
    let mut harness = Harness::started(HarnessOptions {
        initial: Some(exam_settings(KioskMode::None)),
        ..HarnessOptions::default()
    })
    .await;
    let session = harness.session_id();

    harness.client_sends(reconfigure("/exam/other.lkd")).await;

    let proxy = harness.client.last_proxy();
    assert_eq!(proxy.calls(), vec!["reconfiguration_denied /exam/other.lkd"]);
    assert_eq!(harness.session_id(), session);
    assert_eq!(harness.client.started(), 1);
    assert!(harness.registry.reconfiguration_path().is_none());
    assert_eq!(harness.controller.state(), ControllerState::SessionActive);
}

#[tokio::test]
async fn failed_reconfiguration_shuts_down() {
    let mut harness = Harness::started(HarnessOptions::default()).await;
    let proxy = harness.client.last_proxy();

    harness.client_sends(reconfigure("/exam/missing.lkd")).await;

    assert!(!harness.controller.is_session_running());
    assert!(harness.controller.is_shutdown_requested());
    assert_eq!(harness.message_box.errors(), vec![TextKey::SessionStartErrorMessage]);
    assert!(proxy.calls().contains(&"initiate_shutdown".to_owned()));
    assert!(harness.registry.current_session().is_none());
}

#[tokio::test]
async fn completed_client_configuration_can_end_the_runtime() {
    let mut harness = Harness::started(HarnessOptions::default()).await;
    harness
        .settings
        .insert("/exam/client.lkd", Settings::default());
    harness.message_box.answer_questions(MessageBoxResult::Yes);

    harness.client_sends(reconfigure("/exam/client.lkd")).await;

    assert_eq!(
        harness.message_box.questions(),
        vec![TextKey::ClientConfigurationQuestion]
    );
    assert!(harness.controller.is_shutdown_requested());
    assert!(!harness.controller.is_session_running());
    assert!(harness.message_box.errors().is_empty());
}

#[tokio::test]
async fn request_with_wrong_token_changes_nothing() {
    let mut harness = Harness::started(HarnessOptions::default()).await;
    let session = harness.session_id();

    let response = harness.host.dispatch(&super::test_helpers::request(
        Uuid::new_v4(),
        RuntimeMessage::ShutdownRequested,
    ));
    harness.controller.process_pending_events().await;

    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("unauthorized"));
    assert!(!harness.controller.is_shutdown_requested());
    assert_eq!(harness.session_id(), session);
}

#[tokio::test]
async fn unexpected_client_exit_shuts_down_with_error() {
    let mut harness = Harness::started(HarnessOptions::default()).await;

    harness.client.last_process().mark_exited(1);
    harness.controller.process_pending_events().await;

    assert_eq!(harness.message_box.errors(), vec![TextKey::ApplicationErrorMessage]);
    assert!(harness.controller.is_shutdown_requested());
    assert!(!harness.controller.is_session_running());
}

#[tokio::test]
async fn exit_and_connection_loss_report_one_failure() {
    let mut harness = Harness::started(HarnessOptions::default()).await;

    harness.client.last_process().mark_exited(1);
    harness.client.last_proxy().lose_connection();
    harness.controller.process_pending_events().await;

    let application_errors = harness
        .message_box
        .errors()
        .into_iter()
        .filter(|key| *key == TextKey::ApplicationErrorMessage)
        .count();
    assert_eq!(application_errors, 1);
    assert!(harness.controller.is_shutdown_requested());
}

#[tokio::test]
async fn lost_connection_shuts_down() {
    let mut harness = Harness::started(HarnessOptions::default()).await;

    harness.client.last_proxy().lose_connection();
    harness.controller.process_pending_events().await;

    assert!(harness
        .message_box
        .errors()
        .contains(&TextKey::ApplicationErrorMessage));
    assert!(harness.controller.is_shutdown_requested());
    assert!(!harness.controller.is_session_running());
}

#[tokio::test]
async fn events_after_shutdown_request_are_ignored() {
    let mut harness = Harness::started(HarnessOptions::default()).await;
    harness
        .settings
        .insert("/exam/next.lkd", Settings::default());

    harness.controller.request_shutdown();
    harness.controller.request_shutdown();
    harness.client_sends(reconfigure("/exam/next.lkd")).await;
    harness.client.last_process().mark_exited(1);
    harness.controller.process_pending_events().await;

    assert_eq!(harness.client.started(), 1);
    assert!(harness.message_box.errors().is_empty());
    assert!(harness.controller.is_session_running());
}

#[tokio::test]
async fn shutdown_request_ends_run_and_terminate_cleans_up() {
    let mut harness = Harness::started(HarnessOptions {
        initial: Some(exam_settings(KioskMode::CreateNewDesktop)),
        ..HarnessOptions::default()
    })
    .await;
    let proxy = harness.client.last_proxy();

    let response = super::test_helpers::send_as_client(
        &harness.host,
        &harness.registry,
        RuntimeMessage::ShutdownRequested,
    );
    assert!(response.ok);

    tokio::time::timeout(std::time::Duration::from_secs(5), harness.controller.run())
        .await
        .expect("run returns after shutdown request");
    harness.controller.terminate().await;

    assert_eq!(harness.controller.state(), ControllerState::Terminated);
    assert!(proxy.calls().contains(&"initiate_shutdown".to_owned()));
    assert!(proxy.calls().contains(&"disconnect".to_owned()));
    assert_eq!(harness.desktop.desktop_count(), 1);
    assert_eq!(harness.desktop.active().name, "Default");
    assert!(harness.registry.current_session().is_none());
    assert_eq!(
        *harness.bootstrap_log.lock().unwrap(),
        vec!["perform bootstrap", "revert bootstrap"]
    );
    assert!(harness.ui.runtime_window().is_closed());
    assert!(harness.message_box.errors().is_empty());
}

#[tokio::test]
async fn terminate_twice_is_harmless() {
    let mut harness = Harness::started(HarnessOptions::default()).await;

    harness.controller.terminate().await;
    harness.controller.terminate().await;

    assert_eq!(harness.bootstrap_log.lock().unwrap().len(), 2);
}
