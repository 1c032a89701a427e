use lockdown_runtime::desktop::{DesktopService, VirtualDesktopService};
use lockdown_runtime::AppError;

#[test]
fn starts_on_default_desktop_with_running_shell() {
    let service = VirtualDesktopService::new();
    let current = service.current().unwrap();

    assert_eq!(current.name, "Default");
    assert_eq!(service.desktop_count(), 1);
    assert!(service.is_shell_running());
}

#[test]
fn create_activate_and_close_desktop() {
    let service = VirtualDesktopService::new();
    let original = service.current().unwrap();
    let exam = service.create("Exam").unwrap();

    service.activate(&exam).unwrap();
    assert_eq!(service.active(), exam);

    service.activate(&original).unwrap();
    service.close(&exam).unwrap();
    assert_eq!(service.desktop_count(), 1);
}

#[test]
fn duplicate_desktop_name_is_rejected() {
    let service = VirtualDesktopService::new();
    service.create("Exam").unwrap();
    assert!(matches!(service.create("Exam"), Err(AppError::Desktop(_))));
}

#[test]
fn active_desktop_cannot_be_closed() {
    let service = VirtualDesktopService::new();
    let exam = service.create("Exam").unwrap();
    service.activate(&exam).unwrap();

    let err = service.close(&exam).unwrap_err();
    assert!(err.to_string().contains("still active"));
}

#[test]
fn shell_can_be_suspended_and_resumed() {
    let service = VirtualDesktopService::new();
    service.suspend_shell().unwrap();
    assert!(!service.is_shell_running());
    service.resume_shell().unwrap();
    assert!(service.is_shell_running());
}
