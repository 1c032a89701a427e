#![forbid(unsafe_code)]

//! `lockdown-runtime` — supervising process of the lockdown browser.
//!
//! Loads the runtime configuration, wires the pipelines and runs the
//! controller until a shutdown is requested by a cooperating process, a
//! fatal session error or a termination signal.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lockdown_runtime::config::RuntimeConfig;
use lockdown_runtime::desktop::VirtualDesktopService;
use lockdown_runtime::ipc::{RuntimeHost, SocketProxyFactory, SocketServiceConnector};
use lockdown_runtime::operations::{
    ClientOperation, CommunicationHostOperation, ConfigurationOperation, KioskModeOperation,
    Operation, OperationSequence, ServiceOperation, SessionInitializationOperation,
};
use lockdown_runtime::process::CommandProcessFactory;
use lockdown_runtime::registry::{FileSettingsSource, SessionRegistry};
use lockdown_runtime::runtime::{ControllerDependencies, RuntimeController};
use lockdown_runtime::ui::console::ConsoleUserInterface;
use lockdown_runtime::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "lockdown-runtime", about = "Lockdown browser runtime", version, long_about = None)]
struct Cli {
    /// Path to the TOML runtime configuration. Defaults apply when omitted.
    #[arg(long, env = "LOCKDOWN_RUNTIME_CONFIG")]
    config: Option<PathBuf>,

    /// Settings file for the first session.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("lockdown-runtime bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(ref path) => RuntimeConfig::load_from_path(path)?,
        None => RuntimeConfig::default(),
    };
    if let Some(settings) = args.settings {
        config.settings_file = Some(settings);
    }
    info!("configuration loaded");

    // ── Wire collaborators ──────────────────────────────
    let registry = Arc::new(SessionRegistry::new(config.clone()));
    let app_config = registry.app_config();
    let host = Arc::new(RuntimeHost::new(app_config.runtime_address.clone()));
    let ui = Arc::new(ConsoleUserInterface::new());

    let bootstrap = OperationSequence::new(vec![
        Arc::new(CommunicationHostOperation::new(Arc::clone(&host))) as Arc<dyn Operation>,
    ]);

    let session = OperationSequence::repeatable(vec![
        Arc::new(SessionInitializationOperation::new(
            Arc::clone(&registry),
            Arc::clone(&host),
        )) as Arc<dyn Operation>,
        Arc::new(ConfigurationOperation::new(
            Arc::clone(&registry),
            Arc::new(FileSettingsSource),
        )),
        Arc::new(ServiceOperation::new(
            Arc::clone(&registry),
            Arc::new(SocketServiceConnector::new(config.response_timeout())),
        )),
        Arc::new(KioskModeOperation::new(
            Arc::clone(&registry),
            Arc::new(VirtualDesktopService::new()),
        )),
        Arc::new(ClientOperation::new(
            Arc::clone(&registry),
            Arc::clone(&host),
            Arc::new(CommandProcessFactory::new(
                config.client_executable.clone(),
                config.client_args.clone(),
            )),
            Arc::new(SocketProxyFactory::new(
                config.response_timeout(),
                config.proxy_ping_interval(),
            )),
            config.client_startup_timeout(),
            config.client_shutdown_timeout(),
        )),
    ]);

    let shutdown = CancellationToken::new();
    let mut controller = RuntimeController::new(
        ControllerDependencies {
            registry,
            host,
            bootstrap,
            session,
            ui: Arc::clone(&ui) as _,
            message_box: ui,
        },
        shutdown.clone(),
    );

    // ── Shutdown on signal ──────────────────────────────
    let signal_ct = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    // ── Run ─────────────────────────────────────────────
    let started = controller.try_start().await;
    if started {
        controller.run().await;
    }
    controller.terminate().await;

    if started {
        info!("lockdown-runtime shut down");
        Ok(())
    } else {
        error!("lockdown-runtime failed to start");
        Err(AppError::Config("startup failed".into()))
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
