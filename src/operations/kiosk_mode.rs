//! Session step applying the kiosk mode.

use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{error, info};

use crate::desktop::DesktopService;
use crate::operations::{Operation, OperationContext, OperationResult};
use crate::registry::{KioskMode, SessionRegistry};
use crate::ui::TextKey;
use crate::Result;

/// Name of the desktop created for [`KioskMode::CreateNewDesktop`].
pub const SESSION_DESKTOP_NAME: &str = "LockdownDesktop";

/// Locks the desktop environment down according to the settings.
///
/// Desktop handles live in the session record and are carried forward from
/// one session to the next. A repeat with an unchanged mode keeps them; only
/// a revert (or a mode change) releases them.
pub struct KioskModeOperation {
    registry: Arc<SessionRegistry>,
    desktop: Arc<dyn DesktopService>,
    active: Mutex<Option<KioskMode>>,
}

impl KioskModeOperation {
    /// Create the step.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, desktop: Arc<dyn DesktopService>) -> Self {
        Self {
            registry,
            desktop,
            active: Mutex::new(None),
        }
    }

    /// Mode currently applied.
    #[must_use]
    pub fn active_mode(&self) -> Option<KioskMode> {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_active(&self, mode: Option<KioskMode>) {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    fn configured_mode(&self) -> KioskMode {
        self.registry
            .settings()
            .map(|settings| settings.kiosk_mode)
            .unwrap_or_default()
    }

    fn apply(&self, mode: KioskMode) -> Result<()> {
        match mode {
            KioskMode::CreateNewDesktop => self.create_new_desktop(),
            KioskMode::DisableExplorerShell => self.desktop.suspend_shell(),
            KioskMode::None => Ok(()),
        }
    }

    fn release(&self, mode: KioskMode) -> Result<()> {
        match mode {
            KioskMode::CreateNewDesktop => self.close_new_desktop(),
            KioskMode::DisableExplorerShell => self.desktop.resume_shell(),
            KioskMode::None => Ok(()),
        }
    }

    fn create_new_desktop(&self) -> Result<()> {
        let session = self.registry.current_session();
        let original = match session.as_ref().and_then(|s| s.original_desktop.clone()) {
            Some(original) => original,
            None => self.desktop.current()?,
        };
        let new = match session.and_then(|s| s.new_desktop) {
            Some(existing) => existing,
            None => self.desktop.create(SESSION_DESKTOP_NAME)?,
        };

        self.desktop.activate(&new)?;
        info!(original = %original.name, new = %new.name, "switched to session desktop");

        self.registry.update_session(|session| {
            session.original_desktop = Some(original);
            session.new_desktop = Some(new);
        });
        Ok(())
    }

    fn close_new_desktop(&self) -> Result<()> {
        let Some(session) = self.registry.current_session() else {
            return Ok(());
        };

        if let Some(ref original) = session.original_desktop {
            self.desktop.activate(original)?;
        }
        if let Some(ref new) = session.new_desktop {
            self.desktop.close(new)?;
        }

        self.registry.update_session(|session| {
            session.original_desktop = None;
            session.new_desktop = None;
        });
        info!("session desktop closed");
        Ok(())
    }

    fn outcome(&self, result: Result<()>, action: &'static str) -> OperationResult {
        match result {
            Ok(()) => OperationResult::Success,
            Err(err) => {
                error!(%err, action, "kiosk mode operation failed");
                OperationResult::Failed
            }
        }
    }
}

impl Operation for KioskModeOperation {
    fn name(&self) -> &'static str {
        "kiosk_mode"
    }

    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            let mode = self.configured_mode();
            ctx.status(TextKey::StartKioskMode);
            info!(?mode, "initializing kiosk mode");

            let result = self.outcome(self.apply(mode), "apply");
            if result.is_success() {
                self.set_active(Some(mode));
            }
            result
        }
        .boxed()
    }

    fn revert<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            let Some(mode) = self.active_mode() else {
                return OperationResult::Success;
            };
            ctx.status(TextKey::StopKioskMode);
            info!(?mode, "reverting kiosk mode");

            let result = self.outcome(self.release(mode), "release");
            self.set_active(None);
            result
        }
        .boxed()
    }

    fn is_repeatable(&self) -> bool {
        true
    }

    fn repeat<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            let mode = self.configured_mode();
            let active = self.active_mode();
            if active == Some(mode) {
                info!(?mode, "kiosk mode unchanged");
                return OperationResult::Success;
            }

            ctx.status(TextKey::StartKioskMode);
            info!(from = ?active, to = ?mode, "switching kiosk mode");

            if let Some(previous) = active {
                let released = self.outcome(self.release(previous), "release");
                self.set_active(None);
                if !released.is_success() {
                    return released;
                }
            }

            let result = self.outcome(self.apply(mode), "apply");
            if result.is_success() {
                self.set_active(Some(mode));
            }
            result
        }
        .boxed()
    }
}

impl std::fmt::Debug for KioskModeOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KioskModeOperation")
            .field("active", &self.active_mode())
            .finish_non_exhaustive()
    }
}
