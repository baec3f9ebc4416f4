//! Approval policy for done-transitions.

use super::adjustment::AdjustmentEngine;
use crate::storage::ProfileRepository;
use crate::task::TaskRecord;

/// Answers whether a task's completion must be held for approval.
///
/// Blocking the transition is left to the caller.
pub struct ApprovalGate<'e, 'a, R: ProfileRepository + ?Sized> {
    engine: &'e AdjustmentEngine<'a, R>,
}

impl<'e, 'a, R: ProfileRepository + ?Sized> ApprovalGate<'e, 'a, R> {
    pub fn new(engine: &'e AdjustmentEngine<'a, R>) -> Self {
        Self { engine }
    }

    pub fn requires_approval_for_done(&self, task: &TaskRecord) -> bool {
        let Some(estimate) = task.positive_estimate() else {
            return false;
        };
        let Some(estimator) = task.estimator() else {
            return false;
        };
        self.engine
            .preview(&task.organization_id, estimator, estimate, &task.context())
            .requires_approval
    }
}
