//! Error types shared across the runtime.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all runtime failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Runtime configuration parsing or validation failure.
    Config(String),
    /// Exam settings could not be loaded or verified.
    Settings(String),
    /// IPC communication failure.
    Ipc(String),
    /// Client process could not be spawned or controlled.
    Process(String),
    /// Desktop isolation or shell control failure.
    Desktop(String),
    /// Caller presented an invalid or stale startup token.
    Unauthorized(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Settings(msg) => write!(f, "settings: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Desktop(msg) => write!(f, "desktop: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Ipc(format!("invalid message: {err}"))
    }
}
