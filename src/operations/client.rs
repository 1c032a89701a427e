//! Session step starting the client process.
//!
//! The client is spawned with the runtime address, its own endpoint
//! address and the session startup token in its environment. It must
//! report readiness through the runtime host within the startup timeout;
//! only then does the runtime connect its proxy to the client endpoint.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::ipc::{ClientProxy, ProxyFactory, RuntimeHost};
use crate::operations::{Operation, OperationContext, OperationResult};
use crate::process::{ClientProcess, ProcessFactory};
use crate::registry::SessionRegistry;
use crate::ui::TextKey;

/// Starts and stops the client of a session.
pub struct ClientOperation {
    registry: Arc<SessionRegistry>,
    host: Arc<RuntimeHost>,
    processes: Arc<dyn ProcessFactory>,
    proxies: Arc<dyn ProxyFactory>,
    startup_timeout: Duration,
    shutdown_timeout: Duration,
}

impl ClientOperation {
    /// Create the step.
    #[must_use]
    pub fn new(
        registry: Arc<SessionRegistry>,
        host: Arc<RuntimeHost>,
        processes: Arc<dyn ProcessFactory>,
        proxies: Arc<dyn ProxyFactory>,
        startup_timeout: Duration,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            host,
            processes,
            proxies,
            startup_timeout,
            shutdown_timeout,
        }
    }

    async fn start_client(&self, ctx: &OperationContext) -> OperationResult {
        ctx.status(TextKey::StartClient);

        let app_config = self.registry.app_config();
        let Some(session) = self.registry.current_session() else {
            error!("cannot start client without a session");
            return OperationResult::Failed;
        };

        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let ready_tx = Mutex::new(Some(ready_tx));
        let subscription = self.host.client_ready().subscribe(move |_| {
            let sender = ready_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(tx) = sender {
                let _ = tx.send(());
            }
        });

        let process = match self.processes.start(&app_config, &session) {
            Ok(process) => process,
            Err(err) => {
                self.host.client_ready().unsubscribe(subscription);
                error!(%err, "failed to start client");
                return OperationResult::Failed;
            }
        };

        let ready = tokio::select! {
            result = tokio::time::timeout(self.startup_timeout, ready_rx) => match result {
                Ok(Ok(())) => true,
                Ok(Err(_)) => false,
                Err(_) => {
                    error!(timeout = ?self.startup_timeout, "client did not become ready in time");
                    false
                }
            },
            exit_code = process.exited() => {
                error!(exit_code, "client terminated during startup");
                false
            }
        };
        self.host.client_ready().unsubscribe(subscription);

        if !ready {
            process.terminate(self.shutdown_timeout).await;
            return OperationResult::Failed;
        }

        let proxy = match self
            .proxies
            .connect(app_config.client_address.clone(), session.startup_token)
            .await
        {
            Ok(proxy) => proxy,
            Err(err) => {
                error!(%err, address = %app_config.client_address, "failed to connect to client");
                process.terminate(self.shutdown_timeout).await;
                return OperationResult::Failed;
            }
        };

        info!(
            session_id = %session.id,
            pid = process.id().unwrap_or(0),
            "client started"
        );

        self.registry.update_session(|session| {
            session.client_process = Some(process);
            session.client_proxy = Some(proxy);
        });
        OperationResult::Success
    }

    async fn stop_client(&self, ctx: &OperationContext) -> OperationResult {
        let result = self.shutdown_client(ctx).await;
        // The outgoing client can no longer answer; only the new token counts.
        self.host.retire_previous_token();
        result
    }

    async fn shutdown_client(&self, ctx: &OperationContext) -> OperationResult {
        let mut process: Option<Arc<ClientProcess>> = None;
        let mut proxy: Option<Arc<dyn ClientProxy>> = None;
        self.registry.update_session(|session| {
            process = session.client_process.take();
            proxy = session.client_proxy.take();
        });

        if process.is_none() && proxy.is_none() {
            return OperationResult::Success;
        }

        ctx.status(TextKey::StopClient);

        if let Some(proxy) = proxy {
            if !proxy.initiate_shutdown().await.success {
                warn!("client did not acknowledge the shutdown request");
            }
            proxy.disconnect().await;
        }

        let Some(process) = process else {
            return OperationResult::Success;
        };

        if let Some(exit_code) = process.wait_for_exit(self.shutdown_timeout).await {
            info!(exit_code, "client terminated");
            return OperationResult::Success;
        }

        warn!(pid = process.id().unwrap_or(0), "client did not exit in time, terminating it");
        if process.terminate(self.shutdown_timeout).await {
            OperationResult::Success
        } else {
            error!(pid = process.id().unwrap_or(0), "failed to terminate client");
            OperationResult::Failed
        }
    }
}

impl Operation for ClientOperation {
    fn name(&self) -> &'static str {
        "client"
    }

    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        self.start_client(ctx).boxed()
    }

    fn revert<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        self.stop_client(ctx).boxed()
    }

    fn is_repeatable(&self) -> bool {
        true
    }

    fn repeat<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            let stopped = self.stop_client(ctx).await;
            if !stopped.is_success() {
                return stopped;
            }
            self.start_client(ctx).await
        }
        .boxed()
    }
}

impl std::fmt::Debug for ClientOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOperation")
            .field("startup_timeout", &self.startup_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}
