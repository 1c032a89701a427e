use std::path::PathBuf;

use lockdown_runtime::config::RuntimeConfig;
use lockdown_runtime::desktop::DesktopHandle;
use lockdown_runtime::registry::{
    endpoint_address, ConfigurationMode, EndpointRole, SessionRegistry, Settings,
};
use uuid::Uuid;

fn registry() -> SessionRegistry {
    SessionRegistry::new(RuntimeConfig {
        base_address: "exam".into(),
        app_data_folder: PathBuf::from("/tmp/exam-app"),
        program_data_folder: PathBuf::from("/tmp/exam-program"),
        ..RuntimeConfig::default()
    })
}

#[test]
fn endpoint_address_with_and_without_suffix() {
    let id = Uuid::nil();
    assert_eq!(endpoint_address("lockdown", EndpointRole::Service, None), "lockdown-service");
    assert_eq!(
        endpoint_address("lockdown", EndpointRole::Client, Some(id)),
        "lockdown-client-00000000000000000000000000000000"
    );
}

#[test]
fn app_config_is_built_once() {
    let registry = registry();
    let first = registry.app_config();
    let second = registry.app_config();

    assert_eq!(first.runtime_id, second.runtime_id);
    assert_eq!(first.application_start_time, second.application_start_time);
    assert!(first.runtime_address.starts_with("exam-runtime-"));
    assert_eq!(first.service_address, "exam-service");
}

#[test]
fn app_config_derives_paths_and_constants() {
    let config = registry().app_config();

    assert_eq!(config.log_folder, PathBuf::from("/tmp/exam-app/Logs"));
    assert_eq!(config.download_directory, PathBuf::from("/tmp/exam-app/Downloads"));
    assert!(config
        .client_log_file
        .to_string_lossy()
        .ends_with("_Client.log"));
    assert_eq!(config.configuration_file_extension, ".lkd");
    assert_eq!(config.uri_scheme, "lkd");
    assert_eq!(config.uri_scheme_secure, "lkds");
    assert_eq!(
        config.default_settings_path(),
        PathBuf::from("/tmp/exam-program/settings.lkd")
    );
}

#[test]
fn every_session_gets_fresh_identifiers() {
    let registry = registry();
    let first = registry.initialize_session();
    let first_client = registry.app_config().client_address;
    let second = registry.initialize_session();
    let second_client = registry.app_config().client_address;

    assert_ne!(first.id, second.id);
    assert_ne!(first.startup_token, second.startup_token);
    assert_ne!(first_client, second_client);
    assert_eq!(registry.current_session().unwrap().id, second.id);
}

#[test]
fn runtime_identity_survives_new_sessions() {
    let registry = registry();
    let before = registry.app_config();
    registry.initialize_session();
    registry.initialize_session();
    let after = registry.app_config();

    assert_eq!(before.runtime_id, after.runtime_id);
    assert_eq!(before.runtime_address, after.runtime_address);
    assert_ne!(before.client_id, after.client_id);
}

#[test]
fn desktop_handles_carry_forward_to_next_session() {
    let registry = registry();
    registry.initialize_session();
    registry.update_session(|session| {
        session.original_desktop = Some(DesktopHandle { name: "Default".into(), id: 1 });
        session.new_desktop = Some(DesktopHandle { name: "Exam".into(), id: 2 });
    });

    let next = registry.initialize_session();
    assert!(next.is_isolated());
    assert_eq!(next.new_desktop.unwrap().name, "Exam");
    assert_eq!(next.original_desktop.unwrap().id, 1);
}

#[test]
fn update_without_session_reports_false() {
    let registry = registry();
    assert!(!registry.update_session(|_| {}));
    assert!(registry.clear_session().is_none());
}

#[test]
fn clear_session_removes_record() {
    let registry = registry();
    let session = registry.initialize_session();
    assert_eq!(registry.clear_session().unwrap().id, session.id);
    assert!(registry.current_session().is_none());
}

#[test]
fn settings_snapshot_is_replaced_not_mutated() {
    let registry = registry();
    assert!(registry.settings().is_none());

    let defaults = registry.load_default_settings();
    let exam = registry.update_settings(Settings {
        configuration_mode: ConfigurationMode::Exam,
        ..Settings::default()
    });

    assert_eq!(defaults.configuration_mode, ConfigurationMode::ConfigureClient);
    assert_eq!(exam.configuration_mode, ConfigurationMode::Exam);
    assert_eq!(registry.settings().unwrap().configuration_mode, ConfigurationMode::Exam);
}

#[test]
fn reconfiguration_path_is_taken_once() {
    let registry = registry();
    registry.set_reconfiguration_path(Some(PathBuf::from("/tmp/new.lkd")));

    assert_eq!(registry.reconfiguration_path(), Some(PathBuf::from("/tmp/new.lkd")));
    assert_eq!(registry.take_reconfiguration_path(), Some(PathBuf::from("/tmp/new.lkd")));
    assert!(registry.take_reconfiguration_path().is_none());
}
