//! Resolution of the interactive decisions a session pipeline asks for.
//!
//! Passwords are collected locally while the runtime shares the user's
//! desktop, and by the client once the session runs on an isolated desktop
//! where no runtime dialog can be seen. The configuration question is
//! always asked locally.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ipc::protocol::{PasswordReply, PasswordRequestPurpose};
use crate::ipc::{ClientProxy, RuntimeHost};
use crate::operations::{ActionRequired, SequenceObserver};
use crate::registry::SessionRegistry;
use crate::ui::{
    MessageBox, MessageBoxAction, MessageBoxIcon, MessageBoxResult, PasswordDialogResult, TextKey,
    UserInterfaceFactory,
};

/// Resolves [`ActionRequired`] requests of the session sequence.
pub struct SessionNegotiator {
    registry: Arc<SessionRegistry>,
    host: Arc<RuntimeHost>,
    ui: Arc<dyn UserInterfaceFactory>,
    message_box: Arc<dyn MessageBox>,
    shutdown: CancellationToken,
}

impl SessionNegotiator {
    /// Create a negotiator.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        host: Arc<RuntimeHost>,
        ui: Arc<dyn UserInterfaceFactory>,
        message_box: Arc<dyn MessageBox>,
    ) -> Self {
        Self {
            registry,
            host,
            ui,
            message_box,
            shutdown: CancellationToken::new(),
        }
    }

    /// End pending remote password waits once `shutdown` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Obtain a password for `purpose` from wherever the user can be reached.
    pub async fn acquire_password(&self, purpose: PasswordRequestPurpose) -> PasswordDialogResult {
        match self.registry.current_session() {
            Some(session) if session.is_isolated() => {
                debug!(?purpose, session_id = %session.id, "requesting password from client");
                self.remote_password(purpose, session.client_proxy).await
            }
            _ => {
                debug!(?purpose, "requesting password locally");
                self.local_password(purpose).await
            }
        }
    }

    async fn local_password(&self, purpose: PasswordRequestPurpose) -> PasswordDialogResult {
        let (message, title) = match purpose {
            PasswordRequestPurpose::Administrator => {
                (TextKey::AdminPasswordRequired, TextKey::AdminPasswordRequiredTitle)
            }
            PasswordRequestPurpose::Settings => (
                TextKey::SettingsPasswordRequired,
                TextKey::SettingsPasswordRequiredTitle,
            ),
        };

        self.ui.show_password_dialog(message, title).await
    }

    async fn remote_password(
        &self,
        purpose: PasswordRequestPurpose,
        proxy: Option<Arc<dyn ClientProxy>>,
    ) -> PasswordDialogResult {
        let Some(proxy) = proxy else {
            warn!("isolated session has no client connection, password unavailable");
            return PasswordDialogResult::default();
        };

        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel::<PasswordReply>();
        let reply_tx = Mutex::new(Some(reply_tx));
        let subscription = self.host.password_received().subscribe(move |reply: &PasswordReply| {
            if reply.request_id != request_id {
                return;
            }
            let sender = reply_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = sender {
                let _ = tx.send(reply.clone());
            }
        });

        let disconnected = proxy.disconnected();
        let result = if proxy.request_password(purpose, request_id).await.success {
            tokio::select! {
                reply = reply_rx => match reply {
                    Ok(reply) => {
                        info!(%request_id, success = reply.success, "password reply received");
                        PasswordDialogResult {
                            password: reply.password,
                            success: reply.success,
                        }
                    }
                    Err(_) => PasswordDialogResult::default(),
                },
                () = disconnected.cancelled() => {
                    warn!(%request_id, "client disconnected while waiting for password");
                    PasswordDialogResult::default()
                }
                () = self.shutdown.cancelled() => {
                    warn!(%request_id, "shutdown requested while waiting for password");
                    PasswordDialogResult::default()
                }
            }
        } else {
            warn!(%request_id, "failed to send password request to client");
            PasswordDialogResult::default()
        };

        self.host.password_received().unsubscribe(subscription);
        result
    }

    async fn ask_configuration_completed(&self) -> bool {
        let answer = self
            .message_box
            .show(
                TextKey::ClientConfigurationQuestion,
                TextKey::ClientConfigurationQuestionTitle,
                MessageBoxAction::YesNo,
                MessageBoxIcon::Question,
            )
            .await;
        answer == MessageBoxResult::Yes
    }
}

impl SequenceObserver for SessionNegotiator {
    fn action_required<'a>(&'a self, action: &'a mut ActionRequired) -> BoxFuture<'a, ()> {
        async move {
            match action {
                ActionRequired::ConfigurationCompleted { abort_startup } => {
                    *abort_startup = self.ask_configuration_completed().await;
                }
                ActionRequired::PasswordRequired {
                    purpose,
                    password,
                    success,
                } => {
                    let result = self.acquire_password(*purpose).await;
                    *password = result.password;
                    *success = result.success;
                }
            }
        }
        .boxed()
    }
}

impl std::fmt::Debug for SessionNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionNegotiator").finish_non_exhaustive()
    }
}
