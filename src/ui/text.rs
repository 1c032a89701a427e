//! Text keys for every string the runtime shows to the user.

use std::fmt::{Display, Formatter};

/// Identifies a user-visible text; renderers look up the localized string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextKey {
    /// A cooperating process terminated or lost its connection.
    ApplicationErrorMessage,
    /// Title for [`TextKey::ApplicationErrorMessage`].
    ApplicationErrorTitle,
    /// The client configuration was saved; ask whether to quit now.
    ClientConfigurationQuestion,
    /// Title for [`TextKey::ClientConfigurationQuestion`].
    ClientConfigurationQuestionTitle,
    /// Session start failed.
    SessionStartErrorMessage,
    /// Title for [`TextKey::SessionStartErrorMessage`].
    SessionStartErrorTitle,
    /// Session stop failed.
    SessionStopErrorMessage,
    /// Title for [`TextKey::SessionStopErrorMessage`].
    SessionStopErrorTitle,
    /// Application shutdown failed.
    ShutdownErrorMessage,
    /// Title for [`TextKey::ShutdownErrorMessage`].
    ShutdownErrorTitle,
    /// Application startup failed.
    StartupErrorMessage,
    /// Title for [`TextKey::StartupErrorMessage`].
    StartupErrorTitle,
    /// Ask for the administrator password.
    AdminPasswordRequired,
    /// Title for [`TextKey::AdminPasswordRequired`].
    AdminPasswordRequiredTitle,
    /// Ask for the settings password.
    SettingsPasswordRequired,
    /// Title for [`TextKey::SettingsPasswordRequired`].
    SettingsPasswordRequiredTitle,
    /// Status: starting the communication host.
    StartCommunicationHost,
    /// Status: stopping the communication host.
    StopCommunicationHost,
    /// Status: initializing a new session.
    InitializeSession,
    /// Status: loading the session configuration.
    InitializeConfiguration,
    /// Status: contacting the system service.
    InitializeServiceSession,
    /// Status: applying the kiosk mode.
    StartKioskMode,
    /// Status: restoring the desktop after kiosk mode.
    StopKioskMode,
    /// Status: starting the client application.
    StartClient,
    /// Status: stopping the client application.
    StopClient,
    /// Status: rolling back performed operations.
    RevertOperations,
    /// Runtime window status while a session is running.
    ApplicationRunning,
}

impl TextKey {
    /// English text for this key.
    #[must_use]
    pub fn english(self) -> &'static str {
        match self {
            Self::ApplicationErrorMessage => {
                "An unrecoverable error occurred in the client application. The session \
                 will now be terminated."
            }
            Self::ApplicationErrorTitle => "Application Error",
            Self::ClientConfigurationQuestion => {
                "The client configuration has been saved and will be used the next time \
                 the application starts. Do you want to quit for now?"
            }
            Self::ClientConfigurationQuestionTitle => "Configuration Successful",
            Self::SessionStartErrorMessage => {
                "The session could not be started. Please consult the log files for \
                 more information."
            }
            Self::SessionStartErrorTitle => "Session Start Error",
            Self::SessionStopErrorMessage => {
                "The session could not be terminated correctly. Please consult the log \
                 files for more information."
            }
            Self::SessionStopErrorTitle => "Session Stop Error",
            Self::ShutdownErrorMessage => {
                "An unexpected error occurred during the shutdown procedure. Please \
                 consult the log files for more information."
            }
            Self::ShutdownErrorTitle => "Shutdown Error",
            Self::StartupErrorMessage => {
                "An unexpected error occurred during the startup procedure. Please \
                 consult the log files for more information."
            }
            Self::StartupErrorTitle => "Startup Error",
            Self::AdminPasswordRequired => {
                "Please enter the administrator password for the local client configuration:"
            }
            Self::AdminPasswordRequiredTitle => "Administrator Password Required",
            Self::SettingsPasswordRequired => {
                "Please enter the settings password for the selected configuration:"
            }
            Self::SettingsPasswordRequiredTitle => "Settings Password Required",
            Self::StartCommunicationHost => "Starting communication host",
            Self::StopCommunicationHost => "Stopping communication host",
            Self::InitializeSession => "Initializing new session",
            Self::InitializeConfiguration => "Initializing configuration",
            Self::InitializeServiceSession => "Initializing service session",
            Self::StartKioskMode => "Initializing kiosk mode",
            Self::StopKioskMode => "Restoring desktop",
            Self::StartClient => "Starting client application",
            Self::StopClient => "Stopping client application",
            Self::RevertOperations => "Reverting operations",
            Self::ApplicationRunning => "The application is running",
        }
    }
}

impl Display for TextKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.english())
    }
}
