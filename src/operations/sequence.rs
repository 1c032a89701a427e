//! Ordered, reversible operation sequences.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::ipc::events::SubscriptionId;
use crate::operations::context::{OperationContext, ProgressChanged, SequenceObserver};
use crate::operations::{Operation, OperationResult};

/// Runs operations in order and undoes completed ones.
///
/// The sequence keeps a stack of the operations that completed. A failure
/// or abort at step *k* reverts steps *1..k-1* in reverse order; step *k*
/// is never reverted because it did not complete.
pub struct OperationSequence {
    operations: Vec<Arc<dyn Operation>>,
    repeatable: bool,
    stack: Mutex<Vec<usize>>,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn SequenceObserver>)>>,
    next_id: AtomicU64,
}

impl OperationSequence {
    /// A sequence that can be performed and reverted once per cycle.
    #[must_use]
    pub fn new(operations: Vec<Arc<dyn Operation>>) -> Self {
        Self {
            operations,
            repeatable: false,
            stack: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// A sequence that additionally supports [`OperationSequence::try_repeat`].
    #[must_use]
    pub fn repeatable(operations: Vec<Arc<dyn Operation>>) -> Self {
        Self {
            repeatable: true,
            ..Self::new(operations)
        }
    }

    /// Whether the sequence supports repeating.
    #[must_use]
    pub fn is_repeatable(&self) -> bool {
        self.repeatable
    }

    /// Number of operations currently performed and not reverted.
    #[must_use]
    pub fn performed_count(&self) -> usize {
        self.stack().len()
    }

    /// Register an observer for progress, status and actions.
    pub fn subscribe(&self, observer: Arc<dyn SequenceObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Perform every operation in order.
    pub async fn try_perform(&self) -> OperationResult {
        let ctx = self.context();
        self.stack().clear();
        ctx.progress(ProgressChanged::MaxValue(self.operations.len()));
        ctx.progress(ProgressChanged::Value(0));

        for (index, operation) in self.operations.iter().enumerate() {
            info!(operation = operation.name(), "performing operation");
            let result = operation.perform(&ctx).await;

            if result.is_success() {
                self.stack().push(index);
                ctx.progress(ProgressChanged::Increment);
                continue;
            }

            warn!(operation = operation.name(), ?result, "operation did not complete, rolling back");
            self.revert_stack(&ctx).await;
            return result;
        }

        OperationResult::Success
    }

    /// Revert every performed operation in reverse order. Keeps going when
    /// a step fails and reports [`OperationResult::Failed`] at the end.
    pub async fn try_revert(&self) -> OperationResult {
        let ctx = self.context();
        ctx.progress(ProgressChanged::Indeterminate);

        if self.revert_stack(&ctx).await {
            OperationResult::Success
        } else {
            OperationResult::Failed
        }
    }

    /// Repeat the repeatable operations in order, leaving the others as
    /// they are. Anything but success rolls back the whole sequence.
    pub async fn try_repeat(&self) -> OperationResult {
        if !self.repeatable {
            error!("attempted to repeat a sequence that is not repeatable");
            return OperationResult::Failed;
        }

        let ctx = self.context();
        ctx.progress(ProgressChanged::MaxValue(self.operations.len()));
        ctx.progress(ProgressChanged::Value(0));

        for (index, operation) in self.operations.iter().enumerate() {
            if operation.is_repeatable() {
                info!(operation = operation.name(), "repeating operation");
                let result = operation.repeat(&ctx).await;

                if !result.is_success() {
                    warn!(operation = operation.name(), ?result, "repeat did not complete, rolling back");
                    self.revert_stack(&ctx).await;
                    return result;
                }
            }

            {
                let mut stack = self.stack();
                if !stack.contains(&index) {
                    stack.push(index);
                }
            }
            ctx.progress(ProgressChanged::Increment);
        }

        OperationResult::Success
    }

    /// Pop and revert the stack. Returns whether every revert succeeded.
    async fn revert_stack(&self, ctx: &OperationContext) -> bool {
        let mut success = true;

        loop {
            let Some(index) = self.stack().pop() else {
                break;
            };
            let Some(operation) = self.operations.get(index) else {
                continue;
            };

            info!(operation = operation.name(), "reverting operation");
            let result = operation.revert(ctx).await;
            if !result.is_success() {
                error!(operation = operation.name(), ?result, "failed to revert operation");
                success = false;
            }
            ctx.progress(ProgressChanged::Decrement);
        }

        success
    }

    fn context(&self) -> OperationContext {
        let observers = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        OperationContext::new(observers)
    }

    fn stack(&self) -> MutexGuard<'_, Vec<usize>> {
        self.stack.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for OperationSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.operations.iter().map(|op| op.name()).collect();
        f.debug_struct("OperationSequence")
            .field("operations", &names)
            .field("repeatable", &self.repeatable)
            .field("performed", &self.performed_count())
            .finish_non_exhaustive()
    }
}
