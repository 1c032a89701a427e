//! Session step checking the system service.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{error, info, warn};

use crate::ipc::ServiceConnector;
use crate::operations::{Operation, OperationContext, OperationResult};
use crate::registry::{ServicePolicy, SessionRegistry};
use crate::ui::TextKey;

/// Verifies the service is reachable when the settings require it.
pub struct ServiceOperation {
    registry: Arc<SessionRegistry>,
    connector: Arc<dyn ServiceConnector>,
}

impl ServiceOperation {
    /// Create the step.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, connector: Arc<dyn ServiceConnector>) -> Self {
        Self {
            registry,
            connector,
        }
    }

    async fn connect(&self, ctx: &OperationContext) -> OperationResult {
        ctx.status(TextKey::InitializeServiceSession);

        let policy = self
            .registry
            .settings()
            .map(|settings| settings.service_policy)
            .unwrap_or_default();
        let address = self.registry.app_config().service_address;

        if self.connector.probe(address.clone()).await {
            info!(%address, "service is available");
            return OperationResult::Success;
        }

        match policy {
            ServicePolicy::Mandatory => {
                error!(%address, "service is mandatory but not available");
                OperationResult::Failed
            }
            ServicePolicy::Optional => {
                warn!(%address, "service is not available, continuing without it");
                OperationResult::Success
            }
        }
    }
}

impl Operation for ServiceOperation {
    fn name(&self) -> &'static str {
        "service"
    }

    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        self.connect(ctx).boxed()
    }

    fn revert<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async { OperationResult::Success }.boxed()
    }

    fn is_repeatable(&self) -> bool {
        true
    }

    fn repeat<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        self.connect(ctx).boxed()
    }
}

impl std::fmt::Debug for ServiceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceOperation").finish_non_exhaustive()
    }
}
