//! Operation sequence engine and the steps of the runtime pipelines.
//!
//! An [`Operation`] is one reversible step. An
//! [`OperationSequence`](sequence::OperationSequence) runs a list of them
//! in order and rolls back on failure. The runtime builds two sequences:
//! a one-shot bootstrap sequence and a repeatable session sequence.

pub mod client;
pub mod communication_host;
pub mod configuration;
pub mod context;
pub mod kiosk_mode;
pub mod sequence;
pub mod service;
pub mod session_initialization;

use futures_util::future::{BoxFuture, FutureExt};

pub use client::ClientOperation;
pub use communication_host::CommunicationHostOperation;
pub use configuration::ConfigurationOperation;
pub use context::{ActionRequired, OperationContext, ProgressChanged, SequenceObserver};
pub use kiosk_mode::KioskModeOperation;
pub use sequence::OperationSequence;
pub use service::ServiceOperation;
pub use session_initialization::SessionInitializationOperation;

/// Outcome of an operation or a whole sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    /// Completed.
    Success,
    /// Could not complete.
    Failed,
    /// Stopped early on a user or policy decision. Not an error.
    Aborted,
}

impl OperationResult {
    /// Whether the result is [`OperationResult::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// A reversible pipeline step.
///
/// Steps never return errors: anything that prevents a step from
/// completing is logged and turned into [`OperationResult::Failed`].
pub trait Operation: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Run the step.
    fn perform<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult>;

    /// Undo the step.
    fn revert<'a>(&'a self, ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult>;

    /// Whether [`Operation::repeat`] does anything.
    fn is_repeatable(&self) -> bool {
        false
    }

    /// Run the step again for a new session.
    fn repeat<'a>(&'a self, _ctx: &'a OperationContext) -> BoxFuture<'a, OperationResult> {
        async { OperationResult::Success }.boxed()
    }
}
