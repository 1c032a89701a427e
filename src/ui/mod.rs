//! User interface collaborator.
//!
//! The runtime never renders anything itself. It drives a splash screen, a
//! runtime window and modal prompts through the traits below; the console
//! implementation in [`console`] is what the binary uses.

pub mod console;
pub mod text;

use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use text::TextKey;

use crate::registry::AppConfig;

/// Anything that can display pipeline progress and status.
pub trait ProgressIndicator: Send + Sync {
    /// Set the current progress value.
    fn set_value(&self, value: usize);
    /// Set the maximum progress value.
    fn set_max_value(&self, max: usize);
    /// Advance progress by one step.
    fn progress(&self);
    /// Move progress back by one step.
    fn regress(&self);
    /// Switch to an indeterminate progress display.
    fn set_indeterminate(&self);
    /// Replace the status text.
    fn update_status(&self, status: TextKey, animated: bool);
}

/// Window shown while the bootstrap pipeline runs or reverts.
pub trait SplashScreen: ProgressIndicator {
    /// Make the splash screen visible.
    fn show(&self);
    /// Close the splash screen.
    fn close(&self);
}

/// Main runtime window, visible while sessions start and stop.
pub trait RuntimeWindow: ProgressIndicator {
    /// Make the window visible.
    fn show(&self);
    /// Hide the window.
    fn hide(&self);
    /// Raise the window above all others.
    fn bring_to_foreground(&self);
    /// Show the progress bar.
    fn show_progress_bar(&self);
    /// Hide the progress bar.
    fn hide_progress_bar(&self);
    /// Keep the window above every other window.
    fn set_topmost(&self, topmost: bool);
    /// Close the window for good.
    fn close(&self);
}

/// Buttons offered by a message box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBoxAction {
    /// Single confirmation button.
    Confirm,
    /// Yes and no buttons.
    YesNo,
}

/// Icon shown next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBoxIcon {
    /// Informational message.
    Information,
    /// Error message.
    Error,
    /// Question.
    Question,
    /// Warning.
    Warning,
}

/// Button the user pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBoxResult {
    /// No button (dismissed).
    None,
    /// Confirmation button.
    Ok,
    /// Yes button.
    Yes,
    /// No button.
    No,
}

/// Blocking modal notifications and questions.
pub trait MessageBox: Send + Sync {
    /// Show a modal message and resolve once the user dismissed it.
    fn show(
        &self,
        message: TextKey,
        title: TextKey,
        action: MessageBoxAction,
        icon: MessageBoxIcon,
    ) -> BoxFuture<'_, MessageBoxResult>;
}

/// Outcome of a password dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordDialogResult {
    /// Entered password, if the user confirmed.
    pub password: Option<String>,
    /// Whether the user confirmed the dialog.
    pub success: bool,
}

/// Creates the user interface elements the controller needs.
pub trait UserInterfaceFactory: Send + Sync {
    /// Create the runtime window.
    fn create_runtime_window(&self, app_config: &AppConfig) -> Arc<dyn RuntimeWindow>;
    /// Create a splash screen.
    fn create_splash_screen(&self, app_config: &AppConfig) -> Arc<dyn SplashScreen>;
    /// Show a modal password dialog and resolve once it is dismissed.
    fn show_password_dialog(
        &self,
        message: TextKey,
        title: TextKey,
    ) -> BoxFuture<'_, PasswordDialogResult>;
}
