//! Deterministic selection of the next task to work on.

use crate::core::plan::{TaskPlan, TaskState};
use crate::core::types::TaskStatus;

/// True if the task may be picked by [`next_eligible`].
pub fn is_eligible(task: &TaskState) -> bool {
    task.status == TaskStatus::Pending || task.can_retry()
}

/// Index of the first eligible task in plan order.
///
/// Selecting a FAILED task consumes one of its retries. Returns `None` when
/// every task is DONE or terminally FAILED.
pub fn next_eligible(plan: &mut TaskPlan) -> Option<usize> {
    let index = plan.tasks.iter().position(is_eligible)?;
    let task = &mut plan.tasks[index];
    if task.status == TaskStatus::Failed {
        task.retry_count = (task.retry_count + 1).min(task.max_retries);
    }
    Some(index)
}

/// Read-only variant of [`next_eligible`] for status displays.
pub fn peek_eligible(plan: &TaskPlan) -> Option<&TaskState> {
    plan.tasks.iter().find(|task| is_eligible(task))
}
