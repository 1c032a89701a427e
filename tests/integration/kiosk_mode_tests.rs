use std::sync::Arc;

use lockdown_runtime::desktop::VirtualDesktopService;
use lockdown_runtime::operations::kiosk_mode::SESSION_DESKTOP_NAME;
use lockdown_runtime::operations::{KioskModeOperation, Operation, OperationContext};
use lockdown_runtime::registry::{KioskMode, SessionRegistry, Settings};

use super::test_helpers::test_config;

fn setup(mode: KioskMode) -> (Arc<SessionRegistry>, Arc<VirtualDesktopService>, KioskModeOperation) {
    let registry = Arc::new(SessionRegistry::new(test_config()));
    registry.initialize_session();
    registry.update_settings(Settings {
        kiosk_mode: mode,
        ..Settings::default()
    });
    let desktop = Arc::new(VirtualDesktopService::new());
    let operation = KioskModeOperation::new(Arc::clone(&registry), Arc::clone(&desktop) as _);
    (registry, desktop, operation)
}

#[tokio::test]
async fn new_desktop_is_created_and_released() {
    let (registry, desktop, operation) = setup(KioskMode::CreateNewDesktop);
    let ctx = OperationContext::default();

    assert!(operation.perform(&ctx).await.is_success());
    assert_eq!(desktop.active().name, SESSION_DESKTOP_NAME);
    let session = registry.current_session().unwrap();
    assert_eq!(session.original_desktop.unwrap().name, "Default");
    assert!(session.new_desktop.is_some());

    assert!(operation.revert(&ctx).await.is_success());
    assert_eq!(desktop.active().name, "Default");
    assert_eq!(desktop.desktop_count(), 1);
    assert!(!registry.current_session().unwrap().is_isolated());
    assert_eq!(operation.active_mode(), None);
}

#[tokio::test]
async fn repeat_with_same_mode_keeps_desktop_across_sessions() {
    let (registry, desktop, operation) = setup(KioskMode::CreateNewDesktop);
    let ctx = OperationContext::default();

    assert!(operation.perform(&ctx).await.is_success());
    let first = registry.current_session().unwrap().new_desktop;
    registry.initialize_session();

    assert!(operation.repeat(&ctx).await.is_success());
    assert_eq!(registry.current_session().unwrap().new_desktop, first);
    assert_eq!(desktop.desktop_count(), 2);
}

#[tokio::test]
async fn repeat_switches_between_modes() {
    let (registry, desktop, operation) = setup(KioskMode::DisableExplorerShell);
    let ctx = OperationContext::default();

    assert!(operation.perform(&ctx).await.is_success());
    assert!(!desktop.is_shell_running());

    registry.update_settings(Settings {
        kiosk_mode: KioskMode::CreateNewDesktop,
        ..Settings::default()
    });
    assert!(operation.repeat(&ctx).await.is_success());

    assert!(desktop.is_shell_running());
    assert_eq!(desktop.active().name, SESSION_DESKTOP_NAME);
    assert_eq!(operation.active_mode(), Some(KioskMode::CreateNewDesktop));
}

#[tokio::test]
async fn no_kiosk_mode_touches_nothing() {
    let (registry, desktop, operation) = setup(KioskMode::None);
    let ctx = OperationContext::default();

    assert!(operation.perform(&ctx).await.is_success());
    assert!(operation.revert(&ctx).await.is_success());

    assert!(desktop.is_shell_running());
    assert_eq!(desktop.desktop_count(), 1);
    assert!(!registry.current_session().unwrap().is_isolated());
}

#[tokio::test]
async fn revert_without_perform_succeeds() {
    let (_registry, _desktop, operation) = setup(KioskMode::CreateNewDesktop);
    assert!(operation.revert(&OperationContext::default()).await.is_success());
}
