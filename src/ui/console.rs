//! Terminal implementation of the user interface collaborator.
//!
//! Windows are rendered as status lines on stderr; modal prompts read a line
//! from stdin on a blocking task so the async runtime keeps serving IPC
//! while the user thinks.

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use super::{
    MessageBox, MessageBoxAction, MessageBoxIcon, MessageBoxResult, PasswordDialogResult,
    ProgressIndicator, RuntimeWindow, SplashScreen, TextKey, UserInterfaceFactory,
};
use crate::registry::AppConfig;

#[derive(Debug, Default)]
struct ConsoleState {
    visible: bool,
    topmost: bool,
    progress_bar: bool,
    value: usize,
    max: usize,
    indeterminate: bool,
}

/// A status-line window on stderr, used both as splash screen and as
/// runtime window.
#[derive(Debug)]
pub struct ConsoleWindow {
    title: String,
    state: Mutex<ConsoleState>,
}

impl ConsoleWindow {
    fn new(title: String) -> Self {
        Self {
            title,
            state: Mutex::new(ConsoleState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn render(&self, line: &str) {
        if self.state().visible {
            eprintln!("[{}] {line}", self.title);
        }
    }

    /// Whether the window is currently visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.state().visible
    }

    /// Whether the window is kept on top.
    #[must_use]
    pub fn is_topmost(&self) -> bool {
        self.state().topmost
    }
}

impl ProgressIndicator for ConsoleWindow {
    fn set_value(&self, value: usize) {
        self.state().value = value;
    }

    fn set_max_value(&self, max: usize) {
        let mut state = self.state();
        state.max = max;
        state.indeterminate = false;
    }

    fn progress(&self) {
        let (value, max, bar) = {
            let mut state = self.state();
            state.value = state.value.saturating_add(1).min(state.max);
            (state.value, state.max, state.progress_bar)
        };
        if bar {
            self.render(&format!("progress {value}/{max}"));
        }
    }

    fn regress(&self) {
        let mut state = self.state();
        state.value = state.value.saturating_sub(1);
    }

    fn set_indeterminate(&self) {
        self.state().indeterminate = true;
    }

    fn update_status(&self, status: TextKey, animated: bool) {
        let suffix = if animated { "..." } else { "" };
        self.render(&format!("{status}{suffix}"));
    }
}

impl SplashScreen for ConsoleWindow {
    fn show(&self) {
        self.state().visible = true;
        self.render("starting");
    }

    fn close(&self) {
        self.state().visible = false;
    }
}

impl RuntimeWindow for ConsoleWindow {
    fn show(&self) {
        self.state().visible = true;
    }

    fn hide(&self) {
        self.state().visible = false;
    }

    fn bring_to_foreground(&self) {
        debug!(window = %self.title, "window raised");
    }

    fn show_progress_bar(&self) {
        self.state().progress_bar = true;
    }

    fn hide_progress_bar(&self) {
        self.state().progress_bar = false;
    }

    fn set_topmost(&self, topmost: bool) {
        self.state().topmost = topmost;
    }

    fn close(&self) {
        let mut state = self.state();
        state.visible = false;
        state.progress_bar = false;
    }
}

/// Console user interface: creates [`ConsoleWindow`]s and runs modal
/// prompts on stdin.
#[derive(Debug, Default)]
pub struct ConsoleUserInterface;

impl ConsoleUserInterface {
    /// Create the console user interface.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl UserInterfaceFactory for ConsoleUserInterface {
    fn create_runtime_window(&self, app_config: &AppConfig) -> Arc<dyn RuntimeWindow> {
        Arc::new(ConsoleWindow::new(app_config.program_title.clone()))
    }

    fn create_splash_screen(&self, app_config: &AppConfig) -> Arc<dyn SplashScreen> {
        Arc::new(ConsoleWindow::new(format!(
            "{} {}",
            app_config.program_title, app_config.program_version
        )))
    }

    fn show_password_dialog(
        &self,
        message: TextKey,
        title: TextKey,
    ) -> BoxFuture<'_, PasswordDialogResult> {
        async move {
            let prompt = format!("== {title} ==\n{message}\n(empty input cancels) > ");
            match read_line(prompt).await {
                Some(line) if !line.is_empty() => PasswordDialogResult {
                    password: Some(line),
                    success: true,
                },
                _ => PasswordDialogResult::default(),
            }
        }
        .boxed()
    }
}

impl MessageBox for ConsoleUserInterface {
    fn show(
        &self,
        message: TextKey,
        title: TextKey,
        action: MessageBoxAction,
        icon: MessageBoxIcon,
    ) -> BoxFuture<'_, MessageBoxResult> {
        async move {
            let label = match icon {
                MessageBoxIcon::Error => "ERROR",
                MessageBoxIcon::Warning => "WARNING",
                MessageBoxIcon::Question => "QUESTION",
                MessageBoxIcon::Information => "INFO",
            };

            match action {
                MessageBoxAction::Confirm => {
                    let prompt = format!("== {label}: {title} ==\n{message}\n(press enter) > ");
                    match read_line(prompt).await {
                        Some(_) => MessageBoxResult::Ok,
                        None => MessageBoxResult::None,
                    }
                }
                MessageBoxAction::YesNo => {
                    let prompt = format!("== {label}: {title} ==\n{message}\n[y/n] > ");
                    match read_line(prompt).await.as_deref().map(str::to_lowercase) {
                        Some(answer) if answer == "y" || answer == "yes" => MessageBoxResult::Yes,
                        Some(_) => MessageBoxResult::No,
                        None => MessageBoxResult::None,
                    }
                }
            }
        }
        .boxed()
    }
}

/// Print `prompt` and read one trimmed line from stdin. Returns `None` on
/// EOF or I/O failure.
async fn read_line(prompt: String) -> Option<String> {
    let result = tokio::task::spawn_blocking(move || {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(prompt.as_bytes());
        let _ = stderr.flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_owned()),
            Err(err) => {
                warn!(%err, "failed to read console input");
                None
            }
        }
    })
    .await;

    result.unwrap_or_else(|err| {
        warn!(%err, "console prompt task panicked");
        None
    })
}
