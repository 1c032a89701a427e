//! Runtime controller: the state machine driving both pipelines.
//!
//! The controller runs on a single task. Event sources (runtime host,
//! client process, client proxy) only forward [`RuntimeEvent`]s into an
//! unbounded inbox; the controller handles them one at a time, so no
//! handler ever runs while another one, or a pipeline, is in flight.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ipc::{ClientProxy, RuntimeHost, SubscriptionId};
use crate::operations::{OperationResult, OperationSequence, ProgressChanged, SequenceObserver};
use crate::process::ClientProcess;
use crate::registry::{ConfigurationMode, KioskMode, SessionRegistry};
use crate::runtime::negotiation::SessionNegotiator;
use crate::ui::{
    MessageBox, MessageBoxAction, MessageBoxIcon, ProgressIndicator, RuntimeWindow, TextKey,
    UserInterfaceFactory,
};

/// Lifecycle state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Not started.
    Stopped,
    /// Bootstrap or an initial session start in progress.
    Initializing,
    /// Bootstrapped, no session running.
    Ready,
    /// A session is running.
    SessionActive,
    /// A session is being replaced by a reconfigured one.
    Reconfiguring,
    /// Shutdown in progress.
    Terminating,
    /// Shut down.
    Terminated,
}

/// Notification delivered to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A cooperating process asked to load new settings.
    ReconfigurationRequested {
        /// Location of the new settings.
        path: String,
    },
    /// A cooperating process asked the runtime to shut down.
    ShutdownRequested,
    /// The client of `session_id` exited.
    ClientTerminated {
        /// Session the client belonged to.
        session_id: Uuid,
        /// Exit code of the client.
        exit_code: i32,
    },
    /// The connection to the client of `session_id` was lost.
    ClientConnectionLost {
        /// Session the client belonged to.
        session_id: Uuid,
    },
}

/// Collaborators of the controller.
pub struct ControllerDependencies {
    /// Identity and session registry.
    pub registry: Arc<SessionRegistry>,
    /// Runtime IPC host.
    pub host: Arc<RuntimeHost>,
    /// One-shot bootstrap sequence.
    pub bootstrap: OperationSequence,
    /// Repeatable session sequence.
    pub session: OperationSequence,
    /// Creates windows and password dialogs.
    pub ui: Arc<dyn UserInterfaceFactory>,
    /// Modal notifications and questions.
    pub message_box: Arc<dyn MessageBox>,
}

/// Forwards sequence progress and status to a progress indicator.
pub struct ProgressObserver<P: ProgressIndicator + ?Sized>(pub Arc<P>);

impl<P: ProgressIndicator + ?Sized> SequenceObserver for ProgressObserver<P> {
    fn progress_changed(&self, progress: ProgressChanged) {
        match progress {
            ProgressChanged::Value(value) => self.0.set_value(value),
            ProgressChanged::MaxValue(max) => self.0.set_max_value(max),
            ProgressChanged::Increment => self.0.progress(),
            ProgressChanged::Decrement => self.0.regress(),
            ProgressChanged::Indeterminate => self.0.set_indeterminate(),
        }
    }

    fn status_changed(&self, status: TextKey) {
        self.0.update_status(status, true);
    }
}

struct HostSubscriptions {
    reconfiguration: SubscriptionId,
    shutdown: SubscriptionId,
}

struct SessionSubscriptions {
    session_id: Uuid,
    process: Option<(Arc<ClientProcess>, SubscriptionId)>,
    proxy: Option<(Arc<dyn ClientProxy>, SubscriptionId)>,
}

#[derive(Default)]
struct SequenceSubscriptions {
    bootstrap: Option<SubscriptionId>,
    session_progress: Option<SubscriptionId>,
    negotiation: Option<SubscriptionId>,
}

/// Top-level state machine of the runtime.
pub struct RuntimeController {
    registry: Arc<SessionRegistry>,
    host: Arc<RuntimeHost>,
    bootstrap: OperationSequence,
    session: OperationSequence,
    ui: Arc<dyn UserInterfaceFactory>,
    message_box: Arc<dyn MessageBox>,
    negotiator: Arc<SessionNegotiator>,
    state: ControllerState,
    bootstrapped: bool,
    session_running: bool,
    runtime_window: Option<Arc<dyn RuntimeWindow>>,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
    events_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    host_subscriptions: Option<HostSubscriptions>,
    session_subscriptions: Option<SessionSubscriptions>,
    sequence_subscriptions: SequenceSubscriptions,
    shutdown: CancellationToken,
}

impl RuntimeController {
    /// Create a controller. Cancelling `shutdown` ends [`RuntimeController::run`].
    #[must_use]
    pub fn new(dependencies: ControllerDependencies, shutdown: CancellationToken) -> Self {
        let ControllerDependencies {
            registry,
            host,
            bootstrap,
            session,
            ui,
            message_box,
        } = dependencies;

        let negotiator = Arc::new(SessionNegotiator::new(
            Arc::clone(&registry),
            Arc::clone(&host),
            Arc::clone(&ui),
            Arc::clone(&message_box),
        )
        .with_shutdown(shutdown.clone()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            registry,
            host,
            bootstrap,
            session,
            ui,
            message_box,
            negotiator,
            state: ControllerState::Stopped,
            bootstrapped: false,
            session_running: false,
            runtime_window: None,
            events_tx,
            events_rx,
            host_subscriptions: None,
            session_subscriptions: None,
            sequence_subscriptions: SequenceSubscriptions::default(),
            shutdown,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Whether a session is running.
    #[must_use]
    pub fn is_session_running(&self) -> bool {
        self.session_running
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled when shutdown is requested.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The runtime window, once created.
    #[must_use]
    pub fn runtime_window(&self) -> Option<Arc<dyn RuntimeWindow>> {
        self.runtime_window.clone()
    }

    /// Run the bootstrap sequence and start the first session.
    ///
    /// Returns `false` if bootstrapping failed; the bootstrap sequence has
    /// been rolled back in that case.
    pub async fn try_start(&mut self) -> bool {
        info!("initiating startup procedure");
        self.state = ControllerState::Initializing;

        let app_config = self.registry.app_config();
        let splash = self.ui.create_splash_screen(&app_config);
        let window = self.ui.create_runtime_window(&app_config);
        self.runtime_window = Some(Arc::clone(&window));

        self.sequence_subscriptions.bootstrap =
            Some(self.bootstrap.subscribe(Arc::new(ProgressObserver(Arc::clone(&splash)))));
        self.sequence_subscriptions.session_progress =
            Some(self.session.subscribe(Arc::new(ProgressObserver(window))));
        self.sequence_subscriptions.negotiation = Some(
            self.session
                .subscribe(Arc::clone(&self.negotiator) as Arc<dyn SequenceObserver>),
        );

        splash.show();
        let result = self.bootstrap.try_perform().await;

        if result.is_success() {
            self.bootstrapped = true;
            self.subscribe_host_events();
            info!("application successfully initialized");
            splash.close();
            self.start_session(true).await;
            true
        } else {
            error!(?result, "failed to initialize application");
            splash.close();
            self.show_error(TextKey::StartupErrorMessage, TextKey::StartupErrorTitle)
                .await;
            self.state = ControllerState::Stopped;
            false
        }
    }

    /// Handle events until shutdown is requested.
    pub async fn run(&mut self) {
        let shutdown = self.shutdown.clone();
        loop {
            let event = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                event = self.events_rx.recv() => event,
            };

            match event {
                Some(event) => self.handle_event(event).await,
                None => break,
            }
        }
        debug!("controller event loop finished");
    }

    /// Handle every event already queued, without waiting for new ones.
    pub async fn process_pending_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
        }
    }

    /// React to a single event.
    pub async fn handle_event(&mut self, event: RuntimeEvent) {
        if self.is_shutdown_requested() {
            debug!(?event, "shutdown pending, event ignored");
            return;
        }

        match event {
            RuntimeEvent::ReconfigurationRequested { path } => {
                self.handle_reconfiguration(path).await;
            }
            RuntimeEvent::ShutdownRequested => {
                info!("received shutdown request");
                self.request_shutdown();
            }
            RuntimeEvent::ClientTerminated {
                session_id,
                exit_code,
            } => {
                if self.is_live_session(session_id) {
                    error!(%session_id, exit_code, "client terminated unexpectedly");
                    self.handle_client_failure().await;
                }
            }
            RuntimeEvent::ClientConnectionLost { session_id } => {
                if self.is_live_session(session_id) {
                    error!(%session_id, "lost connection to client");
                    self.handle_client_failure().await;
                }
            }
        }
    }

    /// Ask the event loop to stop. Has no effect after the first call.
    pub fn request_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("shutdown requested");
            self.shutdown.cancel();
        }
    }

    /// Stop the session, revert the bootstrap sequence and close the user
    /// interface.
    pub async fn terminate(&mut self) {
        if matches!(
            self.state,
            ControllerState::Terminating | ControllerState::Terminated
        ) {
            return;
        }

        info!("initiating shutdown procedure");
        self.state = ControllerState::Terminating;
        self.unsubscribe_host_events();

        if self.session_running {
            self.stop_session().await;
        }

        if self.bootstrapped {
            let app_config = self.registry.app_config();
            let splash = self.ui.create_splash_screen(&app_config);
            if let Some(id) = self.sequence_subscriptions.bootstrap.take() {
                self.bootstrap.unsubscribe(id);
            }
            self.sequence_subscriptions.bootstrap =
                Some(self.bootstrap.subscribe(Arc::new(ProgressObserver(Arc::clone(&splash)))));

            splash.show();
            let result = self.bootstrap.try_revert().await;
            splash.close();
            self.bootstrapped = false;

            if result.is_success() {
                info!("application successfully finalized");
            } else {
                error!(?result, "failed to finalize application");
                self.show_error(TextKey::ShutdownErrorMessage, TextKey::ShutdownErrorTitle)
                    .await;
            }
        }

        if let Some(window) = self.runtime_window.take() {
            window.close();
        }
        self.unsubscribe_sequences();
        self.state = ControllerState::Terminated;
    }

    async fn start_session(&mut self, initial: bool) {
        let window = self.window();
        window.show();
        window.bring_to_foreground();
        window.show_progress_bar();

        info!(initial, "starting session");
        self.unsubscribe_session_events();
        self.state = if initial {
            ControllerState::Initializing
        } else {
            ControllerState::Reconfiguring
        };

        let result = if initial {
            self.session.try_perform().await
        } else {
            self.session.try_repeat().await
        };

        match result {
            OperationResult::Success => {
                self.subscribe_session_events();
                self.session_running = true;
                self.state = ControllerState::SessionActive;
                self.apply_window_policy(&window);
                info!("session is running");
            }
            OperationResult::Failed => {
                self.session_running = false;
                self.state = ControllerState::Ready;
                error!(initial, "failed to start session");
                self.show_error(TextKey::SessionStartErrorMessage, TextKey::SessionStartErrorTitle)
                    .await;
                self.request_shutdown();
            }
            OperationResult::Aborted => {
                // An aborted repeat has rolled back the running session as
                // well, so there is nothing left to keep the runtime alive for.
                self.session_running = false;
                self.state = ControllerState::Ready;
                info!(initial, "session start aborted");
                self.request_shutdown();
            }
        }
    }

    async fn stop_session(&mut self) {
        let window = self.window();
        window.show();
        window.bring_to_foreground();
        window.show_progress_bar();

        info!("stopping session");
        self.unsubscribe_session_events();

        let result = self.session.try_revert().await;
        self.session_running = false;
        self.state = ControllerState::Ready;

        if result.is_success() {
            info!("session stopped");
        } else {
            error!(?result, "failed to stop session");
            self.show_error(TextKey::SessionStopErrorMessage, TextKey::SessionStopErrorTitle)
                .await;
        }
    }

    async fn handle_reconfiguration(&mut self, path: String) {
        let mode = self
            .registry
            .settings()
            .map(|settings| settings.configuration_mode)
            .unwrap_or_default();

        if mode == ConfigurationMode::ConfigureClient {
            info!(%path, "accepted request for reconfiguration");
            self.registry
                .set_reconfiguration_path(Some(PathBuf::from(&path)));
            let initial = !self.session_running;
            self.start_session(initial).await;
            return;
        }

        info!(%path, "denied request for reconfiguration");
        let proxy = self
            .registry
            .current_session()
            .and_then(|session| session.client_proxy);
        match proxy {
            Some(proxy) => {
                if !proxy.inform_reconfiguration_denied(path).await.success {
                    error!("failed to inform client about denied reconfiguration");
                }
            }
            None => warn!("no client to inform about denied reconfiguration"),
        }
    }

    async fn handle_client_failure(&mut self) {
        if self.session_running {
            self.stop_session().await;
        }
        self.show_error(TextKey::ApplicationErrorMessage, TextKey::ApplicationErrorTitle)
            .await;
        self.request_shutdown();
    }

    fn is_live_session(&self, session_id: Uuid) -> bool {
        self.session_subscriptions
            .as_ref()
            .is_some_and(|subscriptions| subscriptions.session_id == session_id)
    }

    fn apply_window_policy(&self, window: &Arc<dyn RuntimeWindow>) {
        let kiosk_mode = self
            .registry
            .settings()
            .map(|settings| settings.kiosk_mode)
            .unwrap_or_default();

        window.hide_progress_bar();
        window.update_status(TextKey::ApplicationRunning, false);

        match kiosk_mode {
            KioskMode::DisableExplorerShell => window.hide(),
            KioskMode::None => {
                window.set_topmost(false);
                window.show();
            }
            KioskMode::CreateNewDesktop => {
                window.set_topmost(true);
                window.show();
            }
        }
    }

    fn window(&mut self) -> Arc<dyn RuntimeWindow> {
        if let Some(ref window) = self.runtime_window {
            return Arc::clone(window);
        }
        let window = self.ui.create_runtime_window(&self.registry.app_config());
        self.runtime_window = Some(Arc::clone(&window));
        window
    }

    async fn show_error(&self, message: TextKey, title: TextKey) {
        self.message_box
            .show(message, title, MessageBoxAction::Confirm, MessageBoxIcon::Error)
            .await;
    }

    fn subscribe_host_events(&mut self) {
        let tx = self.events_tx.clone();
        let reconfiguration = self
            .host
            .reconfiguration_requested()
            .subscribe(move |path: &String| {
                let _ = tx.send(RuntimeEvent::ReconfigurationRequested { path: path.clone() });
            });

        let tx = self.events_tx.clone();
        let shutdown = self.host.shutdown_requested().subscribe(move |_| {
            let _ = tx.send(RuntimeEvent::ShutdownRequested);
        });

        self.host_subscriptions = Some(HostSubscriptions {
            reconfiguration,
            shutdown,
        });
    }

    fn unsubscribe_host_events(&mut self) {
        if let Some(subscriptions) = self.host_subscriptions.take() {
            self.host
                .reconfiguration_requested()
                .unsubscribe(subscriptions.reconfiguration);
            self.host.shutdown_requested().unsubscribe(subscriptions.shutdown);
        }
    }

    fn subscribe_session_events(&mut self) {
        self.unsubscribe_session_events();

        let Some(session) = self.registry.current_session() else {
            warn!("session running without a session record");
            return;
        };
        let session_id = session.id;

        let process = session.client_process.map(|process| {
            let tx = self.events_tx.clone();
            let id = process.terminated().subscribe(move |exit_code: &i32| {
                let _ = tx.send(RuntimeEvent::ClientTerminated {
                    session_id,
                    exit_code: *exit_code,
                });
            });
            if let Some(exit_code) = process.exit_code() {
                let _ = self.events_tx.send(RuntimeEvent::ClientTerminated {
                    session_id,
                    exit_code,
                });
            }
            (process, id)
        });

        let proxy = session.client_proxy.map(|proxy| {
            let tx = self.events_tx.clone();
            let id = proxy.connection_lost().subscribe(move |_| {
                let _ = tx.send(RuntimeEvent::ClientConnectionLost { session_id });
            });
            if proxy.disconnected().is_cancelled() {
                let _ = self
                    .events_tx
                    .send(RuntimeEvent::ClientConnectionLost { session_id });
            }
            (proxy, id)
        });

        self.session_subscriptions = Some(SessionSubscriptions {
            session_id,
            process,
            proxy,
        });
    }

    fn unsubscribe_session_events(&mut self) {
        if let Some(subscriptions) = self.session_subscriptions.take() {
            if let Some((process, id)) = subscriptions.process {
                process.terminated().unsubscribe(id);
            }
            if let Some((proxy, id)) = subscriptions.proxy {
                proxy.connection_lost().unsubscribe(id);
            }
        }
    }

    fn unsubscribe_sequences(&mut self) {
        if let Some(id) = self.sequence_subscriptions.bootstrap.take() {
            self.bootstrap.unsubscribe(id);
        }
        if let Some(id) = self.sequence_subscriptions.session_progress.take() {
            self.session.unsubscribe(id);
        }
        if let Some(id) = self.sequence_subscriptions.negotiation.take() {
            self.session.unsubscribe(id);
        }
    }
}

impl std::fmt::Debug for RuntimeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeController")
            .field("state", &self.state)
            .field("session_running", &self.session_running)
            .field("bootstrapped", &self.bootstrapped)
            .finish_non_exhaustive()
    }
}
