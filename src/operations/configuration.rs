//! Session step loading the settings for the next session.
//!
//! The settings resource is, in order of precedence: the path of a pending
//! reconfiguration request, the settings file named in the runtime
//! configuration, the default settings file in the program data folder.
//! Without any of these the built-in defaults apply.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{error, info, warn};

use crate::ipc::protocol::PasswordRequestPurpose;
use crate::operations::{Operation, OperationContext, OperationResult};
use crate::registry::{
    verify_password, ConfigurationMode, LoadError, SessionRegistry, Settings, SettingsSource,
};
use crate::ui::TextKey;

/// How many passwords the user may enter before loading fails.
pub const MAX_PASSWORD_ATTEMPTS: usize = 3;

struct Resource {
    path: PathBuf,
    explicit: bool,
}

/// Loads the settings snapshot of the session.
pub struct ConfigurationOperation {
    registry: Arc<SessionRegistry>,
    source: Arc<dyn SettingsSource>,
}

impl ConfigurationOperation {
    /// Create the step.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, source: Arc<dyn SettingsSource>) -> Self {
        Self { registry, source }
    }

    fn resolve_resource(&self) -> Option<Resource> {
        if let Some(path) = self.registry.take_reconfiguration_path() {
            return Some(Resource {
                path,
                explicit: true,
            });
        }

        if let Some(ref path) = self.registry.runtime_config().settings_file {
            return Some(Resource {
                path: path.clone(),
                explicit: true,
            });
        }

        let path = self.registry.app_config().default_settings_path();
        path.is_file().then_some(Resource {
            path,
            explicit: false,
        })
    }

    async fn configure(&self, ctx: &OperationContext, repeat: bool) -> OperationResult {
        ctx.status(TextKey::InitializeConfiguration);

        let current = self.registry.settings();
        let Some(resource) = self.resolve_resource() else {
            self.registry.load_default_settings();
            return OperationResult::Success;
        };

        info!(path = %resource.path.display(), explicit = resource.explicit, "loading settings");

        let settings = match self.load(ctx, &resource).await {
            Ok(settings) => settings,
            Err(result) => return result,
        };

        if repeat && settings.configuration_mode == ConfigurationMode::ConfigureClient {
            if let Some(hash) = current.as_ref().and_then(|s| s.admin_password_hash.clone()) {
                let result = Self::authenticate_admin(ctx, &hash).await;
                if !result.is_success() {
                    return result;
                }
            }
        }

        let mode = settings.configuration_mode;
        self.registry.update_settings(settings);
        info!(?mode, "settings loaded");

        if resource.explicit && mode == ConfigurationMode::ConfigureClient && ctx.confirm_configuration().await {
            info!("startup aborted after client configuration");
            return OperationResult::Aborted;
        }

        OperationResult::Success
    }

    async fn load(
        &self,
        ctx: &OperationContext,
        resource: &Resource,
    ) -> std::result::Result<Settings, OperationResult> {
        let mut password: Option<String> = None;
        let mut attempts = 0;

        loop {
            match self.source.load(&resource.path, password.as_deref()) {
                Ok(settings) => return Ok(settings),
                Err(LoadError::PasswordNeeded(purpose)) => {
                    if attempts == MAX_PASSWORD_ATTEMPTS {
                        error!(attempts, "settings password was wrong too many times");
                        return Err(OperationResult::Failed);
                    }
                    attempts += 1;

                    match ctx.request_password(purpose).await {
                        Some(entered) => password = Some(entered),
                        None => {
                            info!("password entry cancelled");
                            return Err(OperationResult::Aborted);
                        }
                    }
                }
                Err(LoadError::NotFound) if !resource.explicit => {
                    warn!(path = %resource.path.display(), "default settings file vanished, using defaults");
                    return Ok(Settings::default());
                }
                Err(err) => {
                    error!(path = %resource.path.display(), %err, "failed to load settings");
                    return Err(OperationResult::Failed);
                }
            }
        }
    }

    async fn authenticate_admin(ctx: &OperationContext, hash: &str) -> OperationResult {
        for attempt in 1..=MAX_PASSWORD_ATTEMPTS {
            let Some(entered) = ctx.request_password(PasswordRequestPurpose::Administrator).await
            else {
                info!("administrator password entry cancelled");
                return OperationResult::Aborted;
            };

            if verify_password(&entered, hash) {
                return OperationResult::Success;
            }
            warn!(attempt, "wrong administrator password");
        }

        error!("administrator password was wrong too many times");
        OperationResult::Failed
    }
}

impl Operation for ConfigurationOperation {
    fn name(&self) -> &'static str {
        "configuration"
    }

    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        self.configure(ctx, false).boxed()
    }

    fn revert<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async { OperationResult::Success }.boxed()
    }

    fn is_repeatable(&self) -> bool {
        true
    }

    fn repeat<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        self.configure(ctx, true).boxed()
    }
}

impl std::fmt::Debug for ConfigurationOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationOperation").finish_non_exhaustive()
    }
}
