//! Identity and session registry.
//!
//! Owns the process-wide [`AppConfig`], the current [`SessionData`] and the
//! [`Settings`] snapshot. Locks are short-lived and never held across an
//! `.await`; callers receive clones or `Arc` snapshots.

pub mod app_config;
pub mod session;
pub mod settings;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::info;

pub use app_config::{endpoint_address, AppConfig, EndpointRole};
pub use session::SessionData;
pub use settings::{
    hash_password, verify_password, ConfigurationMode, FileSettingsSource, KioskMode, LoadError,
    ServicePolicy, Settings, SettingsSource,
};

use crate::config::RuntimeConfig;

/// Holder of the runtime's identity and session state.
#[derive(Debug)]
pub struct SessionRegistry {
    runtime_config: RuntimeConfig,
    app_config: OnceLock<RwLock<AppConfig>>,
    session: RwLock<Option<SessionData>>,
    settings: RwLock<Option<Arc<Settings>>>,
    reconfiguration_path: RwLock<Option<PathBuf>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(runtime_config: RuntimeConfig) -> Self {
        Self {
            runtime_config,
            app_config: OnceLock::new(),
            session: RwLock::new(None),
            settings: RwLock::new(None),
            reconfiguration_path: RwLock::new(None),
        }
    }

    /// Runtime configuration the registry was created with.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    fn app_config_lock(&self) -> &RwLock<AppConfig> {
        self.app_config
            .get_or_init(|| RwLock::new(AppConfig::build(&self.runtime_config)))
    }

    /// Current application configuration. Built on first access.
    #[must_use]
    pub fn app_config(&self) -> AppConfig {
        self.app_config_lock()
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a new session record with fresh identifiers.
    ///
    /// The new record takes over the desktop handles and the client handles
    /// of the previous one, and the client gets a new identity and endpoint.
    pub fn initialize_session(&self) -> SessionData {
        self.app_config_lock()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .regenerate_client();

        let mut current = self.session.write().unwrap_or_else(PoisonError::into_inner);
        let session = match current.as_ref() {
            Some(previous) => SessionData::succeeding(previous),
            None => SessionData::new(),
        };
        *current = Some(session.clone());

        info!(session_id = %session.id, "session initialized");
        session
    }

    /// Snapshot of the current session record.
    #[must_use]
    pub fn current_session(&self) -> Option<SessionData> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Modify the current session record in place. Returns `false` if there
    /// is none.
    pub fn update_session(&self, update: impl FnOnce(&mut SessionData)) -> bool {
        let mut current = self.session.write().unwrap_or_else(PoisonError::into_inner);
        match current.as_mut() {
            Some(session) => {
                update(session);
                true
            }
            None => false,
        }
    }

    /// Drop the current session record and return it.
    pub fn clear_session(&self) -> Option<SessionData> {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Current settings snapshot, if one was loaded.
    #[must_use]
    pub fn settings(&self) -> Option<Arc<Settings>> {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the settings snapshot.
    pub fn update_settings(&self, settings: Settings) -> Arc<Settings> {
        let settings = Arc::new(settings);
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&settings));
        settings
    }

    /// Replace the settings snapshot with the defaults.
    pub fn load_default_settings(&self) -> Arc<Settings> {
        info!("using default settings");
        self.update_settings(Settings::default())
    }

    /// Path submitted with the pending reconfiguration request, if any.
    #[must_use]
    pub fn reconfiguration_path(&self) -> Option<PathBuf> {
        self.reconfiguration_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record (or clear) the pending reconfiguration path.
    pub fn set_reconfiguration_path(&self, path: Option<PathBuf>) {
        *self
            .reconfiguration_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = path;
    }

    /// Take the pending reconfiguration path, leaving none.
    pub fn take_reconfiguration_path(&self) -> Option<PathBuf> {
        self.reconfiguration_path
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
