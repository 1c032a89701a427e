//! Runtime configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_base_address() -> String {
    "lockdown".into()
}

fn default_program_title() -> String {
    "Lockdown Browser".into()
}

fn default_program_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

fn default_app_data_folder() -> PathBuf {
    std::env::temp_dir().join("lockdown-runtime")
}

fn default_program_data_folder() -> PathBuf {
    std::env::temp_dir().join("lockdown-runtime").join("program")
}

fn default_client_executable() -> PathBuf {
    PathBuf::from("lockdown-client")
}

fn default_client_startup_timeout() -> u64 {
    30
}

fn default_client_shutdown_timeout() -> u64 {
    5
}

fn default_proxy_ping_interval() -> u64 {
    2
}

fn default_response_timeout() -> u64 {
    5
}

/// Configuration of the runtime process, parsed from `runtime.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeConfig {
    /// Scheme prefix for every IPC endpoint address.
    #[serde(default = "default_base_address")]
    pub base_address: String,
    /// Product title shown in the user interface.
    #[serde(default = "default_program_title")]
    pub program_title: String,
    /// Product version.
    #[serde(default = "default_program_version")]
    pub program_version: String,
    /// Product copyright line.
    #[serde(default)]
    pub program_copyright: String,
    /// Per-user data folder (logs, cache, downloads).
    #[serde(default = "default_app_data_folder")]
    pub app_data_folder: PathBuf,
    /// Machine-wide data folder holding the default settings file.
    #[serde(default = "default_program_data_folder")]
    pub program_data_folder: PathBuf,
    /// Executable of the cooperating client process.
    #[serde(default = "default_client_executable")]
    pub client_executable: PathBuf,
    /// Extra arguments passed to the client process.
    #[serde(default)]
    pub client_args: Vec<String>,
    /// Settings file loaded for the first session, if any.
    #[serde(default)]
    pub settings_file: Option<PathBuf>,
    /// How long the client may take to report readiness.
    #[serde(default = "default_client_startup_timeout")]
    pub client_startup_timeout_seconds: u64,
    /// Grace period for the client to exit after a shutdown request.
    #[serde(default = "default_client_shutdown_timeout")]
    pub client_shutdown_timeout_seconds: u64,
    /// Interval between proxy liveness pings.
    #[serde(default = "default_proxy_ping_interval")]
    pub proxy_ping_interval_seconds: u64,
    /// How long a proxy waits for the peer to acknowledge a message.
    #[serde(default = "default_response_timeout")]
    pub response_timeout_seconds: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_address: default_base_address(),
            program_title: default_program_title(),
            program_version: default_program_version(),
            program_copyright: String::new(),
            app_data_folder: default_app_data_folder(),
            program_data_folder: default_program_data_folder(),
            client_executable: default_client_executable(),
            client_args: Vec::new(),
            settings_file: None,
            client_startup_timeout_seconds: default_client_startup_timeout(),
            client_shutdown_timeout_seconds: default_client_shutdown_timeout(),
            proxy_ping_interval_seconds: default_proxy_ping_interval(),
            response_timeout_seconds: default_response_timeout(),
        }
    }
}

impl RuntimeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Client readiness timeout.
    #[must_use]
    pub fn client_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.client_startup_timeout_seconds)
    }

    /// Client shutdown grace period.
    #[must_use]
    pub fn client_shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.client_shutdown_timeout_seconds)
    }

    /// Proxy liveness ping interval.
    #[must_use]
    pub fn proxy_ping_interval(&self) -> Duration {
        Duration::from_secs(self.proxy_ping_interval_seconds)
    }

    /// Proxy acknowledgement timeout.
    #[must_use]
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.base_address.is_empty()
            || self
                .base_address
                .chars()
                .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(AppError::Config(
                "base_address must be a non-empty name without whitespace or path separators"
                    .into(),
            ));
        }

        if self.client_executable.as_os_str().is_empty() {
            return Err(AppError::Config("client_executable must not be empty".into()));
        }

        if self.client_startup_timeout_seconds == 0 {
            return Err(AppError::Config(
                "client_startup_timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.proxy_ping_interval_seconds == 0 || self.response_timeout_seconds == 0 {
            return Err(AppError::Config(
                "proxy_ping_interval_seconds and response_timeout_seconds must be greater than zero"
                    .into(),
            ));
        }

        Ok(())
    }
}
