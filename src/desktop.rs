//! Desktop isolation and shell control.
//!
//! Creating a separate desktop or suspending the desktop shell are thin
//! operating-system calls; the runtime only needs to sequence them. The
//! [`DesktopService`] trait is the seam, and [`VirtualDesktopService`]
//! keeps the same bookkeeping in memory on platforms without desktop
//! isolation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::{AppError, Result};

/// Opaque reference to a desktop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DesktopHandle {
    /// Desktop name.
    pub name: String,
    /// Platform handle value.
    pub id: u64,
}

/// Operating-system desktop operations used by the kiosk mode step.
pub trait DesktopService: Send + Sync {
    /// The desktop the runtime currently runs on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Desktop` if the desktop cannot be queried.
    fn current(&self) -> Result<DesktopHandle>;

    /// Create a new desktop called `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Desktop` if the desktop cannot be created.
    fn create(&self, name: &str) -> Result<DesktopHandle>;

    /// Switch input and display to `desktop`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Desktop` if the desktop does not exist.
    fn activate(&self, desktop: &DesktopHandle) -> Result<()>;

    /// Close `desktop`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Desktop` if the desktop is unknown or still active.
    fn close(&self, desktop: &DesktopHandle) -> Result<()>;

    /// Terminate the desktop shell so it cannot be used during the exam.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Desktop` on failure.
    fn suspend_shell(&self) -> Result<()>;

    /// Restart the desktop shell.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Desktop` on failure.
    fn resume_shell(&self) -> Result<()>;
}

#[derive(Debug)]
struct VirtualState {
    desktops: HashMap<u64, String>,
    active: u64,
    next_id: u64,
    shell_running: bool,
}

/// In-memory desktop service.
#[derive(Debug)]
pub struct VirtualDesktopService {
    state: Mutex<VirtualState>,
}

const DEFAULT_DESKTOP_ID: u64 = 1;

impl VirtualDesktopService {
    /// Create a service with a single `Default` desktop and a running shell.
    #[must_use]
    pub fn new() -> Self {
        let mut desktops = HashMap::new();
        desktops.insert(DEFAULT_DESKTOP_ID, "Default".to_owned());
        Self {
            state: Mutex::new(VirtualState {
                desktops,
                active: DEFAULT_DESKTOP_ID,
                next_id: DEFAULT_DESKTOP_ID + 1,
                shell_running: true,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The active desktop.
    #[must_use]
    pub fn active(&self) -> DesktopHandle {
        let state = self.state();
        DesktopHandle {
            name: state
                .desktops
                .get(&state.active)
                .cloned()
                .unwrap_or_default(),
            id: state.active,
        }
    }

    /// Number of open desktops, including the default one.
    #[must_use]
    pub fn desktop_count(&self) -> usize {
        self.state().desktops.len()
    }

    /// Whether the shell is running.
    #[must_use]
    pub fn is_shell_running(&self) -> bool {
        self.state().shell_running
    }
}

impl Default for VirtualDesktopService {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopService for VirtualDesktopService {
    fn current(&self) -> Result<DesktopHandle> {
        Ok(self.active())
    }

    fn create(&self, name: &str) -> Result<DesktopHandle> {
        let mut state = self.state();
        if state.desktops.values().any(|existing| existing == name) {
            return Err(AppError::Desktop(format!("desktop '{name}' already exists")));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.desktops.insert(id, name.to_owned());
        info!(desktop = name, id, "desktop created");

        Ok(DesktopHandle {
            name: name.to_owned(),
            id,
        })
    }

    fn activate(&self, desktop: &DesktopHandle) -> Result<()> {
        let mut state = self.state();
        if !state.desktops.contains_key(&desktop.id) {
            return Err(AppError::Desktop(format!(
                "desktop '{}' does not exist",
                desktop.name
            )));
        }

        state.active = desktop.id;
        info!(desktop = %desktop.name, id = desktop.id, "desktop activated");
        Ok(())
    }

    fn close(&self, desktop: &DesktopHandle) -> Result<()> {
        let mut state = self.state();
        if state.active == desktop.id {
            return Err(AppError::Desktop(format!(
                "desktop '{}' is still active",
                desktop.name
            )));
        }

        if state.desktops.remove(&desktop.id).is_none() {
            return Err(AppError::Desktop(format!(
                "desktop '{}' does not exist",
                desktop.name
            )));
        }

        info!(desktop = %desktop.name, id = desktop.id, "desktop closed");
        Ok(())
    }

    fn suspend_shell(&self) -> Result<()> {
        self.state().shell_running = false;
        info!("desktop shell suspended");
        Ok(())
    }

    fn resume_shell(&self) -> Result<()> {
        self.state().shell_running = true;
        info!("desktop shell resumed");
        Ok(())
    }
}
