//! Session step creating the session record.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::info;

use crate::ipc::RuntimeHost;
use crate::operations::{Operation, OperationContext, OperationResult};
use crate::registry::SessionRegistry;
use crate::ui::TextKey;

/// Creates a new session record and binds the host to its startup token.
#[derive(Debug)]
pub struct SessionInitializationOperation {
    registry: Arc<SessionRegistry>,
    host: Arc<RuntimeHost>,
}

impl SessionInitializationOperation {
    /// Create the step.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, host: Arc<RuntimeHost>) -> Self {
        Self { registry, host }
    }

    fn initialize(&self, ctx: &OperationContext) -> OperationResult {
        ctx.status(TextKey::InitializeSession);

        let session = self.registry.initialize_session();
        self.host.allow_token(session.startup_token);

        info!(
            session_id = %session.id,
            client_address = %self.registry.app_config().client_address,
            "new session created"
        );
        OperationResult::Success
    }
}

impl Operation for SessionInitializationOperation {
    fn name(&self) -> &'static str {
        "session_initialization"
    }

    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move { self.initialize(ctx) }.boxed()
    }

    fn revert<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            self.host.revoke_token();
            if let Some(session) = self.registry.clear_session() {
                info!(session_id = %session.id, "session record released");
            }
            OperationResult::Success
        }
        .boxed()
    }

    fn is_repeatable(&self) -> bool {
        true
    }

    fn repeat<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move { self.initialize(ctx) }.boxed()
    }
}
