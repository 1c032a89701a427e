//! Per-session record.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::desktop::DesktopHandle;
use crate::ipc::ClientProxy;
use crate::process::ClientProcess;

/// State of one exam session.
#[derive(Clone)]
pub struct SessionData {
    /// Session identity.
    pub id: Uuid,
    /// Secret binding IPC requests to this session.
    pub startup_token: Uuid,
    /// Desktop that was active before kiosk mode switched away from it.
    pub original_desktop: Option<DesktopHandle>,
    /// Isolated desktop the session runs on.
    pub new_desktop: Option<DesktopHandle>,
    /// Running client process.
    pub client_process: Option<Arc<ClientProcess>>,
    /// Channel to the running client.
    pub client_proxy: Option<Arc<dyn ClientProxy>>,
}

impl SessionData {
    /// A session with fresh identifiers and no resources.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            startup_token: Uuid::new_v4(),
            original_desktop: None,
            new_desktop: None,
            client_process: None,
            client_proxy: None,
        }
    }

    /// A session with fresh identifiers that takes over the desktops and
    /// client handles of `previous`.
    #[must_use]
    pub fn succeeding(previous: &Self) -> Self {
        Self {
            original_desktop: previous.original_desktop.clone(),
            new_desktop: previous.new_desktop.clone(),
            client_process: previous.client_process.clone(),
            client_proxy: previous.client_proxy.clone(),
            ..Self::new()
        }
    }

    /// Whether the session runs on its own desktop.
    #[must_use]
    pub fn is_isolated(&self) -> bool {
        self.new_desktop.is_some()
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionData")
            .field("id", &self.id)
            .field("original_desktop", &self.original_desktop)
            .field("new_desktop", &self.new_desktop)
            .field(
                "client_pid",
                &self.client_process.as_ref().and_then(|p| p.id()),
            )
            .field("has_proxy", &self.client_proxy.is_some())
            .finish_non_exhaustive()
    }
}
