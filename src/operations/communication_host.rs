//! Bootstrap step starting the runtime host.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{error, info};

use crate::ipc::RuntimeHost;
use crate::operations::{Operation, OperationContext, OperationResult};
use crate::ui::TextKey;

/// Starts the runtime host on perform and stops it on revert.
#[derive(Debug)]
pub struct CommunicationHostOperation {
    host: Arc<RuntimeHost>,
}

impl CommunicationHostOperation {
    /// Create the step for `host`.
    #[must_use]
    pub fn new(host: Arc<RuntimeHost>) -> Self {
        Self { host }
    }
}

impl Operation for CommunicationHostOperation {
    fn name(&self) -> &'static str {
        "communication_host"
    }

    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            ctx.status(TextKey::StartCommunicationHost);

            match self.host.start() {
                Ok(()) => {
                    info!(address = %self.host.address(), "communication host started");
                    OperationResult::Success
                }
                Err(err) => {
                    error!(%err, "failed to start communication host");
                    OperationResult::Failed
                }
            }
        }
        .boxed()
    }

    fn revert<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async move {
            ctx.status(TextKey::StopCommunicationHost);
            self.host.stop().await;
            OperationResult::Success
        }
        .boxed()
    }
}
