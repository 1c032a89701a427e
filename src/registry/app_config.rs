//! Process-wide application configuration and endpoint addressing.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::config::RuntimeConfig;

/// Role of a process taking part in IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    /// The client process hosting the browser.
    Client,
    /// The runtime process itself.
    Runtime,
    /// The system service.
    Service,
}

impl EndpointRole {
    /// Role segment used in endpoint addresses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Runtime => "runtime",
            Self::Service => "service",
        }
    }
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build an endpoint address from `base`, `role` and an optional unique
/// suffix: `lockdown-runtime` or `lockdown-client-<32 hex digits>`.
#[must_use]
pub fn endpoint_address(base: &str, role: EndpointRole, suffix: Option<Uuid>) -> String {
    match suffix {
        Some(id) => format!("{base}-{role}-{}", id.simple()),
        None => format!("{base}-{role}"),
    }
}

const LOG_FILE_TIME_FORMAT: &str = "%Y-%m-%d_%Hh%Mm%Ss";

/// Application configuration shared by every component.
///
/// Created once per process. Only `client_id` and `client_address` change
/// afterwards, once for every new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// When the runtime process started.
    pub application_start_time: DateTime<Local>,
    /// Per-user data folder.
    pub app_data_folder: PathBuf,
    /// Machine-wide data folder.
    pub program_data_folder: PathBuf,
    /// Folder receiving all log files.
    pub log_folder: PathBuf,
    /// Browser cache location.
    pub browser_cache_path: PathBuf,
    /// Download target of the browser.
    pub download_directory: PathBuf,
    /// Log file of the runtime process.
    pub runtime_log_file: PathBuf,
    /// Log file of the client process.
    pub client_log_file: PathBuf,
    /// Log file of the browser engine.
    pub browser_log_file: PathBuf,
    /// Executable started by the client step.
    pub client_executable_path: PathBuf,
    /// Identity of the current client.
    pub client_id: Uuid,
    /// Endpoint the current client listens on.
    pub client_address: String,
    /// Identity of this runtime instance.
    pub runtime_id: Uuid,
    /// Endpoint of the runtime host.
    pub runtime_address: String,
    /// Endpoint of the system service.
    pub service_address: String,
    /// Base used to derive endpoint addresses.
    pub base_address: String,
    /// Extension of settings files.
    pub configuration_file_extension: String,
    /// Name of the settings file looked up in the program data folder.
    pub default_settings_file_name: String,
    /// URI scheme for settings links.
    pub uri_scheme: String,
    /// URI scheme for settings links over TLS.
    pub uri_scheme_secure: String,
    /// Product title.
    pub program_title: String,
    /// Product version.
    pub program_version: String,
    /// Product copyright line.
    pub program_copyright: String,
}

impl AppConfig {
    /// Derive the application configuration from the runtime configuration.
    #[must_use]
    pub fn build(config: &RuntimeConfig) -> Self {
        let start = Local::now();
        let stamp = start.format(LOG_FILE_TIME_FORMAT).to_string();
        let log_folder = config.app_data_folder.join("Logs");
        let client_id = Uuid::new_v4();
        let runtime_id = Uuid::new_v4();

        Self {
            application_start_time: start,
            app_data_folder: config.app_data_folder.clone(),
            program_data_folder: config.program_data_folder.clone(),
            browser_cache_path: config.app_data_folder.join("Cache"),
            download_directory: config.app_data_folder.join("Downloads"),
            runtime_log_file: log_folder.join(format!("{stamp}_Runtime.log")),
            client_log_file: log_folder.join(format!("{stamp}_Client.log")),
            browser_log_file: log_folder.join(format!("{stamp}_Browser.log")),
            log_folder,
            client_executable_path: config.client_executable.clone(),
            client_id,
            client_address: endpoint_address(&config.base_address, EndpointRole::Client, Some(client_id)),
            runtime_id,
            runtime_address: endpoint_address(
                &config.base_address,
                EndpointRole::Runtime,
                Some(runtime_id),
            ),
            service_address: endpoint_address(&config.base_address, EndpointRole::Service, None),
            base_address: config.base_address.clone(),
            configuration_file_extension: ".lkd".into(),
            default_settings_file_name: "settings.lkd".into(),
            uri_scheme: "lkd".into(),
            uri_scheme_secure: "lkds".into(),
            program_title: config.program_title.clone(),
            program_version: config.program_version.clone(),
            program_copyright: config.program_copyright.clone(),
        }
    }

    /// Give the next client a fresh identity and endpoint.
    pub fn regenerate_client(&mut self) {
        self.client_id = Uuid::new_v4();
        self.client_address =
            endpoint_address(&self.base_address, EndpointRole::Client, Some(self.client_id));
    }

    /// Location of the machine-wide default settings file.
    #[must_use]
    pub fn default_settings_path(&self) -> PathBuf {
        self.program_data_folder.join(&self.default_settings_file_name)
    }
}
