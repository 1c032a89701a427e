//! Client process spawning and monitoring.
//!
//! Each session runs one client process. The process is spawned with
//! `kill_on_drop(true)` and watched by a monitor task that reports the exit
//! code through [`ClientProcess::terminated`]. Whether an exit was expected
//! is for the subscriber to decide: the controller removes its subscription
//! before it stops a client on purpose.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tracing::{info, info_span, warn, Instrument};

use crate::ipc::events::EventSource;
use crate::registry::{AppConfig, SessionData};
use crate::{AppError, Result};

/// Environment variable carrying the runtime host address.
pub const ENV_RUNTIME_ADDRESS: &str = "LOCKDOWN_RUNTIME_ADDRESS";
/// Environment variable carrying the address the client must listen on.
pub const ENV_CLIENT_ADDRESS: &str = "LOCKDOWN_CLIENT_ADDRESS";
/// Environment variable carrying the session startup token.
pub const ENV_STARTUP_TOKEN: &str = "LOCKDOWN_STARTUP_TOKEN";
/// Environment variable carrying the session id.
pub const ENV_SESSION_ID: &str = "LOCKDOWN_SESSION_ID";
/// Environment variable carrying the client log file path.
pub const ENV_CLIENT_LOG_FILE: &str = "LOCKDOWN_CLIENT_LOG_FILE";

/// Exit code reported when the real code is unavailable.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Handle to a running (or finished) client process.
#[derive(Debug)]
pub struct ClientProcess {
    pid: Option<u32>,
    terminated: EventSource<i32>,
    exit: watch::Sender<Option<i32>>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ClientProcess {
    /// Create a handle that is not attached to a monitor task. The exit has
    /// to be reported through [`ClientProcess::mark_exited`].
    #[must_use]
    pub fn new(pid: Option<u32>) -> Self {
        let (exit, _) = watch::channel(None);
        Self {
            pid,
            terminated: EventSource::new(),
            exit,
            kill_tx: Mutex::new(None),
        }
    }

    /// Spawn `command` and monitor it until it exits.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process cannot be started.
    pub fn spawn(mut command: Command) -> Result<Arc<Self>> {
        command.kill_on_drop(true);
        let mut child = command
            .spawn()
            .map_err(|err| AppError::Process(format!("failed to spawn client: {err}")))?;

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let mut process = Self::new(child.id());
        process.kill_tx = Mutex::new(Some(kill_tx));
        let process = Arc::new(process);

        let monitored = Arc::clone(&process);
        let span = info_span!("client_monitor", pid = process.pid.unwrap_or(0));
        tokio::spawn(
            async move {
                let status = tokio::select! {
                    status = child.wait() => status,
                    _ = kill_rx => {
                        if let Err(err) = child.kill().await {
                            warn!(%err, "failed to kill client process");
                        }
                        child.wait().await
                    }
                };

                let code = match status {
                    Ok(status) => status.code().unwrap_or(UNKNOWN_EXIT_CODE),
                    Err(err) => {
                        warn!(%err, "failed to wait for client process");
                        UNKNOWN_EXIT_CODE
                    }
                };

                monitored.mark_exited(code);
            }
            .instrument(span),
        );

        Ok(process)
    }

    /// Operating-system process id, if known.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Raised once with the exit code when the process ends.
    #[must_use]
    pub fn terminated(&self) -> &EventSource<i32> {
        &self.terminated
    }

    /// Record the exit code and raise [`ClientProcess::terminated`]. Only
    /// the first call has an effect.
    pub fn mark_exited(&self, code: i32) {
        let first = self.exit.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(code);
                true
            } else {
                false
            }
        });

        if first {
            info!(pid = self.pid.unwrap_or(0), exit_code = code, "client process exited");
            self.terminated.publish(&code);
        }
    }

    /// Exit code, once the process has ended.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// Whether the process has ended.
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit_code().is_some()
    }

    /// Wait up to `timeout` for the process to end and return its exit code.
    pub async fn wait_for_exit(&self, timeout: Duration) -> Option<i32> {
        let mut rx = self.exit.subscribe();
        let code = match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(code)) => *code,
            _ => None,
        };
        code
    }

    /// Wait until the process ends.
    pub async fn exited(&self) -> i32 {
        let mut rx = self.exit.subscribe();
        let code = match rx.wait_for(Option::is_some).await {
            Ok(code) => *code,
            Err(_) => None,
        };
        code.unwrap_or(UNKNOWN_EXIT_CODE)
    }

    /// Kill the process immediately.
    pub fn kill(&self) {
        let sender = self
            .kill_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
    }

    /// Ask the process to exit (SIGTERM on unix), wait `grace`, then kill
    /// it. Returns whether the process is gone.
    pub async fn terminate(&self, grace: Duration) -> bool {
        if self.has_exited() {
            return true;
        }

        #[cfg(unix)]
        self.signal_terminate();

        if self.wait_for_exit(grace).await.is_some() {
            return true;
        }

        warn!(
            pid = self.pid.unwrap_or(0),
            "client process did not exit within grace period, forcing kill"
        );
        self.kill();
        self.wait_for_exit(grace).await.is_some()
    }

    #[cfg(unix)]
    fn signal_terminate(&self) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };

        if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            warn!(pid, %err, "failed to send SIGTERM to client process");
        }
    }
}

/// Starts the client process for a session.
pub trait ProcessFactory: Send + Sync {
    /// Start the client for `session`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the process cannot be started.
    fn start(&self, app_config: &AppConfig, session: &SessionData) -> Result<Arc<ClientProcess>>;
}

/// Spawns the configured client executable.
#[derive(Debug, Clone)]
pub struct CommandProcessFactory {
    executable: PathBuf,
    args: Vec<String>,
}

impl CommandProcessFactory {
    /// Create a factory for `executable` with `args`.
    #[must_use]
    pub fn new(executable: PathBuf, args: Vec<String>) -> Self {
        Self { executable, args }
    }
}

impl ProcessFactory for CommandProcessFactory {
    fn start(&self, app_config: &AppConfig, session: &SessionData) -> Result<Arc<ClientProcess>> {
        let mut command = Command::new(&self.executable);
        command
            .args(&self.args)
            .env(ENV_RUNTIME_ADDRESS, &app_config.runtime_address)
            .env(ENV_CLIENT_ADDRESS, &app_config.client_address)
            .env(ENV_STARTUP_TOKEN, session.startup_token.to_string())
            .env(ENV_SESSION_ID, session.id.to_string())
            .env(ENV_CLIENT_LOG_FILE, &app_config.client_log_file)
            .stdin(Stdio::null());

        let process = ClientProcess::spawn(command)?;

        info!(
            session_id = %session.id,
            pid = process.id().unwrap_or(0),
            executable = %self.executable.display(),
            "client process spawned"
        );

        Ok(process)
    }
}
