//! Runtime host: the IPC endpoint cooperating processes talk to.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON
//! [`HostRequest`]s, validates the session startup token and raises the
//! matching named event. The host never acts on a request itself; the
//! controller and the pipeline steps subscribe to the events they care
//! about.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures_util::StreamExt;
use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions, ToNsName};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::ipc::codec::{to_line, IpcCodec};
use crate::ipc::events::EventSource;
use crate::ipc::protocol::{HostRequest, IpcResponse, PasswordReply, RuntimeMessage};
use crate::{AppError, Result};

#[derive(Debug, Default, Clone, Copy)]
struct AllowedTokens {
    current: Option<Uuid>,
    previous: Option<Uuid>,
}

impl AllowedTokens {
    fn accepts(self, token: Uuid) -> bool {
        self.current == Some(token) || self.previous == Some(token)
    }
}

struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// IPC host of the runtime process.
pub struct RuntimeHost {
    address: String,
    allowed_tokens: RwLock<AllowedTokens>,
    client_ready: EventSource<()>,
    reconfiguration_requested: EventSource<String>,
    shutdown_requested: EventSource<()>,
    password_received: EventSource<PasswordReply>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl RuntimeHost {
    /// Create a host for `address`. Nothing listens until
    /// [`RuntimeHost::start`] is called.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            allowed_tokens: RwLock::new(AllowedTokens::default()),
            client_ready: EventSource::new(),
            reconfiguration_requested: EventSource::new(),
            shutdown_requested: EventSource::new(),
            password_received: EventSource::new(),
            listener: Mutex::new(None),
        }
    }

    /// Endpoint address of the host.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Accept requests carrying `token` from now on.
    ///
    /// The token it replaces stays valid until
    /// [`RuntimeHost::retire_previous_token`] is called, so the client of the
    /// outgoing session can still answer while a new session is prepared.
    pub fn allow_token(&self, token: Uuid) {
        let mut tokens = self
            .allowed_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if tokens.current != Some(token) {
            tokens.previous = tokens.current;
            tokens.current = Some(token);
        }
        debug!(retiring = tokens.previous.is_some(), "startup token replaced");
    }

    /// Stop accepting the token replaced by the last [`RuntimeHost::allow_token`].
    pub fn retire_previous_token(&self) {
        let retired = self
            .allowed_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .previous
            .take();
        if retired.is_some() {
            debug!("previous startup token retired");
        }
    }

    /// Reject every authenticated request until a new token is allowed.
    pub fn revoke_token(&self) {
        *self
            .allowed_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner) = AllowedTokens::default();
        debug!("startup tokens revoked");
    }

    /// Raised when the client reports it is ready.
    #[must_use]
    pub fn client_ready(&self) -> &EventSource<()> {
        &self.client_ready
    }

    /// Raised with the submitted path when a reconfiguration is requested.
    #[must_use]
    pub fn reconfiguration_requested(&self) -> &EventSource<String> {
        &self.reconfiguration_requested
    }

    /// Raised when a cooperating process asks the runtime to shut down.
    #[must_use]
    pub fn shutdown_requested(&self) -> &EventSource<()> {
        &self.shutdown_requested
    }

    /// Raised for every password reply.
    #[must_use]
    pub fn password_received(&self) -> &EventSource<PasswordReply> {
        &self.password_received
    }

    fn authenticate(&self, token: Option<Uuid>) -> Result<()> {
        let allowed = *self
            .allowed_tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match token {
            _ if allowed.current.is_none() => {
                Err(AppError::Unauthorized("no session token is allowed".into()))
            }
            Some(provided) if allowed.accepts(provided) => Ok(()),
            _ => Err(AppError::Unauthorized("invalid startup token".into())),
        }
    }

    /// Authenticate `request` and raise the matching event.
    pub fn dispatch(&self, request: &HostRequest) -> IpcResponse {
        let kind = request.message.kind();

        if matches!(request.message, RuntimeMessage::Ping) {
            return IpcResponse::success();
        }

        if let Err(err) = self.authenticate(request.token) {
            warn!(message = kind, %err, "IPC request rejected");
            return IpcResponse::error("unauthorized");
        }

        debug!(message = kind, "IPC request accepted");

        match &request.message {
            RuntimeMessage::Ping => {}
            RuntimeMessage::ClientReady => {
                self.client_ready.publish(&());
            }
            RuntimeMessage::ReconfigurationRequested { path } => {
                self.reconfiguration_requested.publish(path);
            }
            RuntimeMessage::ShutdownRequested => {
                self.shutdown_requested.publish(&());
            }
            RuntimeMessage::PasswordReply {
                request_id,
                password,
                success,
            } => {
                self.password_received.publish(&PasswordReply {
                    request_id: *request_id,
                    password: password.clone(),
                    success: *success,
                });
            }
        }

        IpcResponse::success()
    }

    /// Start listening on the host address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Ipc` if the host is already running or the
    /// listener cannot be created.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Err(AppError::Ipc("runtime host is already running".into()));
        }

        let name = self
            .address
            .clone()
            .to_ns_name::<GenericNamespaced>()
            .map_err(|err| {
                AppError::Ipc(format!("invalid ipc socket name '{}': {err}", self.address))
            })?;

        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

        info!(address = %self.address, "runtime host listening");

        let cancel = CancellationToken::new();
        let ct = cancel.clone();
        let host = Arc::clone(self);
        let span = info_span!("runtime_host", address = %self.address);
        let task = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = ct.cancelled() => {
                            info!("runtime host shutting down");
                            break;
                        }
                        accept_result = listener.accept() => {
                            match accept_result {
                                Ok(stream) => {
                                    let host = Arc::clone(&host);
                                    let ct = ct.clone();
                                    tokio::spawn(handle_connection(stream, host, ct));
                                }
                                Err(err) => {
                                    warn!(%err, "IPC accept failed");
                                }
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );

        *guard = Some(ListenerHandle { cancel, task });
        Ok(())
    }

    /// Stop listening and close all connections.
    pub async fn stop(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            handle.cancel.cancel();
            if let Err(err) = handle.task.await {
                warn!(%err, "runtime host task ended abnormally");
            }
            info!(address = %self.address, "runtime host stopped");
        }
    }

    /// Whether the listener is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl std::fmt::Debug for RuntimeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHost")
            .field("address", &self.address)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Serve a single connection until EOF, error or host shutdown.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    host: Arc<RuntimeHost>,
    ct: CancellationToken,
) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut lines = FramedRead::new(reader, IpcCodec::new());

        loop {
            let line = tokio::select! {
                () = ct.cancelled() => break,
                item = lines.next() => match item {
                    None => break,
                    Some(Ok(line)) => line,
                    Some(Err(err)) => {
                        warn!(%err, "ipc read error");
                        break;
                    }
                },
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<HostRequest>(trimmed) {
                Ok(request) => host.dispatch(&request),
                Err(err) => IpcResponse::error(format!("invalid json: {err}")),
            };

            let bytes = match to_line(&response) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(%err, "failed to serialize ipc response");
                    break;
                }
            };

            if let Err(err) = writer.write_all(&bytes).await {
                warn!(%err, "failed to write ipc response");
                break;
            }
        }

        debug!("IPC connection closed");
    }
    .instrument(span)
    .await;
}
