//! Wire protocol between the runtime and its cooperating processes.
//!
//! Every message is one JSON object per line.
//!
//! Client → runtime host:
//! ```json
//! {"token": "…", "message": {"type": "client_ready"}}
//! {"token": "…", "message": {"type": "reconfiguration_requested", "path": "/exam.lkd"}}
//! {"token": "…", "message": {"type": "shutdown_requested"}}
//! {"token": "…", "message": {"type": "password_reply", "request_id": "…", "password": "…", "success": true}}
//! {"message": {"type": "ping"}}
//! ```
//!
//! Runtime → client:
//! ```json
//! {"token": "…", "message": {"type": "reconfiguration_denied", "path": "/exam.lkd"}}
//! {"token": "…", "message": {"type": "password_requested", "purpose": "administrator", "request_id": "…"}}
//! {"token": "…", "message": {"type": "shutdown_initiated"}}
//! {"token": "…", "message": {"type": "ping"}}
//! ```
//!
//! Every request is acknowledged with `{"ok": true}` or
//! `{"ok": false, "error": "…"}`. The acknowledgement only says the message
//! was accepted; logical answers (such as a password) travel as separate
//! requests in the opposite direction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a password is needed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PasswordRequestPurpose {
    /// Administrator password of the local client configuration.
    Administrator,
    /// Password protecting a settings file.
    Settings,
}

/// Message sent to the runtime host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeMessage {
    /// Liveness check; needs no token.
    Ping,
    /// The client finished its startup and listens on its endpoint.
    ClientReady,
    /// The client asks the runtime to load a new configuration.
    ReconfigurationRequested {
        /// Location of the new settings resource.
        path: String,
    },
    /// The client asks the runtime to shut down.
    ShutdownRequested,
    /// Answer to a [`ClientMessage::PasswordRequested`].
    PasswordReply {
        /// Correlation id of the request.
        request_id: Uuid,
        /// Entered password, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        /// Whether the user confirmed the dialog.
        success: bool,
    },
}

impl RuntimeMessage {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ClientReady => "client_ready",
            Self::ReconfigurationRequested { .. } => "reconfiguration_requested",
            Self::ShutdownRequested => "shutdown_requested",
            Self::PasswordReply { .. } => "password_reply",
        }
    }
}

/// Envelope for [`RuntimeMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRequest {
    /// Startup token of the session the sender belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Uuid>,
    /// The message itself.
    pub message: RuntimeMessage,
}

/// Message sent by the runtime to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness check.
    Ping,
    /// A reconfiguration request was refused.
    ReconfigurationDenied {
        /// The path that was submitted.
        path: String,
    },
    /// The client must ask its user for a password and reply with
    /// [`RuntimeMessage::PasswordReply`].
    PasswordRequested {
        /// Why the password is needed.
        purpose: PasswordRequestPurpose,
        /// Correlation id to echo back.
        request_id: Uuid,
    },
    /// The client must close and exit.
    ShutdownInitiated,
}

impl ClientMessage {
    /// Short name used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ReconfigurationDenied { .. } => "reconfiguration_denied",
            Self::PasswordRequested { .. } => "password_requested",
            Self::ShutdownInitiated => "shutdown_initiated",
        }
    }
}

/// Envelope for [`ClientMessage`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientRequest {
    /// Startup token of the current session.
    pub token: Uuid,
    /// The message itself.
    pub message: ClientMessage,
}

/// Acknowledgement for every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpcResponse {
    /// Whether the message was accepted.
    pub ok: bool,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    /// Accepted.
    #[must_use]
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// Rejected with `message`.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

/// Password reply as raised by the runtime host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReply {
    /// Correlation id of the request.
    pub request_id: Uuid,
    /// Entered password, if any.
    pub password: Option<String>,
    /// Whether the user confirmed.
    pub success: bool,
}

/// Transport-level outcome of a proxy call: could the message be delivered
/// and acknowledged at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunicationResult {
    /// Whether the peer acknowledged the message.
    pub success: bool,
}

impl CommunicationResult {
    /// Delivered and acknowledged.
    #[must_use]
    pub fn delivered() -> Self {
        Self { success: true }
    }

    /// Not delivered.
    #[must_use]
    pub fn failed() -> Self {
        Self { success: false }
    }
}
