//! Exam settings snapshot and the source it is loaded from.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ipc::protocol::PasswordRequestPurpose;

/// How strongly the desktop environment is locked down.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KioskMode {
    /// No desktop changes.
    #[default]
    None,
    /// The desktop shell is suspended for the session.
    DisableExplorerShell,
    /// The session runs on a separate, newly created desktop.
    CreateNewDesktop,
}

/// What the settings are meant for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationMode {
    /// Settings configure the local client; reconfiguration is allowed.
    #[default]
    ConfigureClient,
    /// Settings start an exam; reconfiguration is refused.
    Exam,
}

/// Whether the system service must be reachable.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServicePolicy {
    /// Session start fails without the service.
    Mandatory,
    /// A missing service is only logged.
    #[default]
    Optional,
}

/// Browser permissions. Opaque to the runtime; forwarded to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserSettings {
    /// Page opened when the session starts.
    pub start_url: String,
    /// Address bar visible.
    pub allow_address_bar: bool,
    /// Back navigation allowed.
    pub allow_backward_navigation: bool,
    /// Forward navigation allowed.
    pub allow_forward_navigation: bool,
    /// Page reload allowed.
    pub allow_reloading: bool,
    /// Developer console allowed.
    pub allow_developer_console: bool,
    /// Downloads allowed.
    pub allow_downloads: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            start_url: "https://www.safeexambrowser.org/testing".into(),
            allow_address_bar: true,
            allow_backward_navigation: true,
            allow_forward_navigation: true,
            allow_reloading: true,
            allow_developer_console: true,
            allow_downloads: true,
        }
    }
}

/// Taskbar permissions. Opaque to the runtime; forwarded to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TaskbarSettings {
    /// Application log button shown.
    pub allow_application_log: bool,
    /// Keyboard layout switcher shown.
    pub allow_keyboard_layout: bool,
    /// Wireless network control shown.
    pub allow_wireless_network: bool,
    /// Clock shown.
    pub show_clock: bool,
}

impl Default for TaskbarSettings {
    fn default() -> Self {
        Self {
            allow_application_log: true,
            allow_keyboard_layout: true,
            allow_wireless_network: true,
            show_clock: true,
        }
    }
}

/// Lockdown policy of one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Desktop lockdown level.
    pub kiosk_mode: KioskMode,
    /// Purpose of the settings.
    pub configuration_mode: ConfigurationMode,
    /// Service requirement.
    pub service_policy: ServicePolicy,
    /// SHA-256 hex digest of the administrator password, if one is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_password_hash: Option<String>,
    /// Browser section.
    pub browser: BrowserSettings,
    /// Taskbar section.
    pub taskbar: TaskbarSettings,
}

/// SHA-256 hex digest of `password`.
#[must_use]
pub fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Whether `password` matches `hash`.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    hash_password(password).eq_ignore_ascii_case(hash)
}

/// Why settings could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The resource does not exist.
    NotFound,
    /// The resource is protected; retry with the right password.
    PasswordNeeded(PasswordRequestPurpose),
    /// The resource exists but is not valid settings data.
    InvalidData(String),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("settings resource not found"),
            Self::PasswordNeeded(purpose) => write!(f, "password needed ({purpose:?})"),
            Self::InvalidData(msg) => write!(f, "invalid settings data: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Supplies settings snapshots.
pub trait SettingsSource: Send + Sync {
    /// Load the settings stored at `resource`, unlocking it with `password`
    /// if it is protected.
    ///
    /// # Errors
    ///
    /// See [`LoadError`].
    fn load(&self, resource: &Path, password: Option<&str>) -> Result<Settings, LoadError>;
}

#[derive(Deserialize)]
struct SettingsFile {
    #[serde(default)]
    settings_password_hash: Option<String>,
    #[serde(flatten)]
    settings: Settings,
}

/// Reads settings from TOML files.
///
/// A top-level `settings_password_hash` protects the file; the supplied
/// password must hash to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSettingsSource;

impl SettingsSource for FileSettingsSource {
    fn load(&self, resource: &Path, password: Option<&str>) -> Result<Settings, LoadError> {
        let raw = fs::read_to_string(resource).map_err(|err| match err.kind() {
            ErrorKind::NotFound => LoadError::NotFound,
            _ => LoadError::InvalidData(err.to_string()),
        })?;

        let file: SettingsFile =
            toml::from_str(&raw).map_err(|err| LoadError::InvalidData(err.to_string()))?;

        if let Some(ref expected) = file.settings_password_hash {
            match password {
                Some(candidate) if verify_password(candidate, expected) => {}
                _ => return Err(LoadError::PasswordNeeded(PasswordRequestPurpose::Settings)),
            }
        }

        Ok(file.settings)
    }
}
