//! Progress, status and interactive callbacks of a running sequence.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::ipc::protocol::PasswordRequestPurpose;
use crate::ui::TextKey;

/// Progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressChanged {
    /// Set the current value.
    Value(usize),
    /// Set the maximum value.
    MaxValue(usize),
    /// One step done.
    Increment,
    /// One step undone.
    Decrement,
    /// Progress cannot be quantified.
    Indeterminate,
}

/// Interactive decision a step needs before it can continue. Observers
/// fill in the output fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequired {
    /// The client configuration is complete; should the runtime stop here?
    ConfigurationCompleted {
        /// Set to `true` to stop instead of starting a session.
        abort_startup: bool,
    },
    /// A password is needed.
    PasswordRequired {
        /// What the password is for.
        purpose: PasswordRequestPurpose,
        /// Entered password.
        password: Option<String>,
        /// Whether the user confirmed.
        success: bool,
    },
}

/// Receives the notifications of a sequence.
pub trait SequenceObserver: Send + Sync {
    /// Progress changed.
    fn progress_changed(&self, _progress: ProgressChanged) {}

    /// Status text changed.
    fn status_changed(&self, _status: TextKey) {}

    /// A step waits for `action` to be resolved.
    fn action_required<'a>(&'a self, _action: &'a mut ActionRequired) -> BoxFuture<'a, ()> {
        async {}.boxed()
    }
}

/// Handed to every step; forwards to the observers of the sequence.
#[derive(Clone, Default)]
pub struct OperationContext {
    observers: Vec<Arc<dyn SequenceObserver>>,
}

impl OperationContext {
    /// Context delivering to `observers` in order.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn SequenceObserver>>) -> Self {
        Self { observers }
    }

    /// Report progress.
    pub fn progress(&self, progress: ProgressChanged) {
        for observer in &self.observers {
            observer.progress_changed(progress);
        }
    }

    /// Report a status change.
    pub fn status(&self, status: TextKey) {
        debug!(%status, "status changed");
        for observer in &self.observers {
            observer.status_changed(status);
        }
    }

    /// Let every observer resolve `action`, one after the other.
    pub async fn request_action(&self, action: &mut ActionRequired) {
        for observer in &self.observers {
            observer.action_required(action).await;
        }
    }

    /// Ask for a password. `None` means the user cancelled or no password
    /// could be obtained.
    pub async fn request_password(&self, purpose: PasswordRequestPurpose) -> Option<String> {
        let mut action = ActionRequired::PasswordRequired {
            purpose,
            password: None,
            success: false,
        };
        self.request_action(&mut action).await;

        match action {
            ActionRequired::PasswordRequired {
                password,
                success: true,
                ..
            } => Some(password.unwrap_or_default()),
            _ => None,
        }
    }

    /// Tell the user the client configuration is complete. Returns `true`
    /// if startup should stop here.
    pub async fn confirm_configuration(&self) -> bool {
        let mut action = ActionRequired::ConfigurationCompleted {
            abort_startup: false,
        };
        self.request_action(&mut action).await;

        matches!(
            action,
            ActionRequired::ConfigurationCompleted {
                abort_startup: true
            }
        )
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("observers", &self.observers.len())
            .finish()
    }
}
