//! Loop-owned state transitions for a single task.
//!
//! Each transition classifies what happened as a [`Verdict`] and writes the
//! matching status, error and iteration bookkeeping. Verification goes through
//! an [`ArtifactProbe`], never through what the tool reported about itself.

use std::path::Path;

use crate::core::path::normalize_claimed;
use crate::core::plan::{TaskPlan, TaskState};
use crate::core::types::{TaskStatus, ToolResult, Verdict};
use crate::core::verification::{ArtifactProbe, verify_task};
use crate::error::OrchestrationError;

/// A verdict plus the error that caused it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub verdict: Verdict,
    pub error: Option<OrchestrationError>,
}

impl Transition {
    fn ok(verdict: Verdict) -> Self {
        Self {
            verdict,
            error: None,
        }
    }

    fn failed(verdict: Verdict, error: OrchestrationError) -> Self {
        Self {
            verdict,
            error: Some(error),
        }
    }
}

/// Mark the selected task IN_PROGRESS for `iteration`.
pub fn begin(task: &mut TaskState, iteration: u32) {
    task.status = TaskStatus::InProgress;
    task.iteration_started = Some(iteration);
    task.iteration_completed = None;
}

/// Parameters were rejected before the tool ran. No retry is consumed.
pub fn apply_rejection(task: &mut TaskState, error: OrchestrationError, iteration: u32) -> Transition {
    if let OrchestrationError::Validation { tool, .. } = &error {
        task.tool_used = Some(tool.clone());
    }
    settle(task, TaskStatus::Pending, Some(error.to_string()), iteration);
    Transition::failed(Verdict::Rejected, error)
}

/// Tool lookup failed or the tool itself failed.
pub fn apply_tool_failure(task: &mut TaskState, error: OrchestrationError, iteration: u32) -> Transition {
    if let OrchestrationError::ToolExecution { tool, .. } = &error {
        task.tool_used = Some(tool.clone());
    }
    settle(task, TaskStatus::Failed, Some(error.to_string()), iteration);
    Transition::failed(Verdict::ToolFailed, error)
}

/// Fold a tool result into the task and verify its artifacts.
///
/// - `success: false` fails the task.
/// - All targets verified (or nothing to verify) marks it DONE.
/// - Nothing verified is a hallucination and fails the task.
/// - Some expected artifacts verified returns it to PENDING.
/// - A claim outside the working directory counts as missing.
pub fn apply_tool_result<P: ArtifactProbe + ?Sized>(
    task: &mut TaskState,
    tool: &str,
    result: &ToolResult,
    probe: &P,
    workdir: &Path,
    iteration: u32,
) -> Transition {
    task.tool_used = Some(tool.to_string());

    if !result.success {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "tool reported failure".to_string());
        return apply_tool_failure(
            task,
            OrchestrationError::ToolExecution {
                tool: tool.to_string(),
                message,
            },
            iteration,
        );
    }

    let mut unconfined = Vec::new();
    for claimed in result.files_created() {
        match normalize_claimed(workdir, &claimed) {
            Some(path) => task.record_created(path),
            None => unconfined.push(claimed),
        }
    }

    let had_expectations = !task.files_expected.is_empty();
    let record = verify_task(probe, task);
    if unconfined.is_empty() {
        if record.all_verified() {
            settle(task, TaskStatus::Done, None, iteration);
            return Transition::ok(Verdict::Verified);
        }
        if record.verified_count() > 0 && had_expectations {
            settle(task, TaskStatus::Pending, None, iteration);
            return Transition::ok(Verdict::Progress);
        }
    }

    let mut missing = if had_expectations {
        record.missing_in(&task.files_expected)
    } else {
        record.missing_in(&task.files_created)
    };
    missing.extend(unconfined);
    let error = OrchestrationError::reported_success(missing);
    settle(task, TaskStatus::Failed, Some(error.to_string()), iteration);
    Transition::failed(Verdict::Hallucination, error)
}

/// The oracle declared the task complete; believe it only if verification agrees.
pub fn apply_completion_claim<P: ArtifactProbe + ?Sized>(
    task: &mut TaskState,
    probe: &P,
    iteration: u32,
) -> Transition {
    let record = verify_task(probe, task);
    if record.all_verified() {
        settle(task, TaskStatus::Done, None, iteration);
        return Transition::ok(Verdict::Verified);
    }

    let targets = if task.files_expected.is_empty() {
        task.files_created.clone()
    } else {
        task.files_expected.clone()
    };
    let error = OrchestrationError::claimed_complete(record.missing_in(&targets));
    settle(task, TaskStatus::Failed, Some(error.to_string()), iteration);
    Transition::failed(Verdict::Hallucination, error)
}

/// The oracle answered with an `error` action (or its answer was unusable).
pub fn apply_oracle_error(task: &mut TaskState, message: &str, iteration: u32) -> Transition {
    settle(task, TaskStatus::Failed, Some(message.to_string()), iteration);
    Transition::ok(Verdict::OracleError)
}

/// Repetition threshold hit: fail the task and spend all of its retries.
pub fn apply_loop_detected(task: &mut TaskState, error: OrchestrationError) -> Transition {
    task.status = TaskStatus::Failed;
    task.retry_count = task.max_retries;
    task.error = Some(error.to_string());
    Transition::failed(Verdict::LoopDetected, error)
}

/// Return tasks left IN_PROGRESS by an interrupted run to PENDING.
///
/// Returns the ids that were reset.
pub fn recover_interrupted(plan: &mut TaskPlan) -> Vec<u32> {
    plan.tasks
        .iter_mut()
        .filter(|task| task.status == TaskStatus::InProgress)
        .map(|task| {
            task.status = TaskStatus::Pending;
            task.id
        })
        .collect()
}

fn settle(task: &mut TaskState, status: TaskStatus, error: Option<String>, iteration: u32) {
    task.status = status;
    task.error = error;
    task.iteration_completed = Some(iteration);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StaticProbe, files_created_result, task, task_with_status};
    use serde_json::Map;

    fn workdir() -> &'static Path {
        Path::new("/work")
    }

    #[test]
    fn verified_artifacts_mark_the_task_done() {
        let mut t = task(1, &["out.txt"]);
        begin(&mut t, 1);
        let result = files_created_result(&["/work/out.txt"]);
        let transition =
            apply_tool_result(&mut t, "write_file", &result, &StaticProbe::new(["out.txt"]), workdir(), 1);

        assert_eq!(transition.verdict, Verdict::Verified);
        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.files_created, vec!["out.txt".to_string()]);
        assert_eq!(t.files_verified, vec!["out.txt".to_string()]);
        assert_eq!(t.tool_used.as_deref(), Some("write_file"));
        assert_eq!(t.iteration_completed, Some(1));
    }

    /// A tool that claims success but leaves nothing on disk must not be able
    /// to complete a task that expects artifacts.
    #[test]
    fn success_without_artifacts_is_a_hallucination() {
        let mut t = task(1, &["src/app.rs"]);
        begin(&mut t, 2);
        let result = ToolResult::ok(Map::new());
        let transition = apply_tool_result(
            &mut t,
            "write_file",
            &result,
            &StaticProbe::new(Vec::<&str>::new()),
            workdir(),
            2,
        );

        assert_eq!(transition.verdict, Verdict::Hallucination);
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(
            t.error.as_deref(),
            Some("reported success with no verifiable artifacts (missing: src/app.rs)")
        );
        assert!(t.files_verified.is_empty());
    }

    #[test]
    fn lying_claims_without_expectations_are_hallucinations() {
        let mut t = task(1, &[]);
        let result = files_created_result(&["ghost.txt"]);
        let transition = apply_tool_result(
            &mut t,
            "write_file",
            &result,
            &StaticProbe::new(Vec::<&str>::new()),
            workdir(),
            1,
        );
        assert_eq!(transition.verdict, Verdict::Hallucination);
        assert_eq!(t.status, TaskStatus::Failed);
    }

    #[test]
    fn claims_outside_the_workdir_are_never_verified() {
        let mut t = task(1, &[]);
        let result = files_created_result(&["/etc/hostname"]);
        let transition = apply_tool_result(
            &mut t,
            "fake",
            &result,
            &StaticProbe::new(["/etc/hostname"]),
            workdir(),
            1,
        );

        assert_eq!(transition.verdict, Verdict::Hallucination);
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.files_created.is_empty());
        assert!(t.files_verified.is_empty());
        assert_eq!(
            t.error.as_deref(),
            Some("reported success with no verifiable artifacts (missing: /etc/hostname)")
        );
    }

    #[test]
    fn an_unconfined_claim_spoils_otherwise_verified_work() {
        let mut t = task(1, &["a.txt"]);
        let result = files_created_result(&["a.txt", "../outside.txt"]);
        let transition =
            apply_tool_result(&mut t, "write_file", &result, &StaticProbe::new(["a.txt"]), workdir(), 1);

        assert_eq!(transition.verdict, Verdict::Hallucination);
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.files_verified, vec!["a.txt".to_string()]);
    }

    #[test]
    fn partial_artifacts_return_the_task_to_pending() {
        let mut t = task(1, &["a.txt", "b.txt"]);
        let result = files_created_result(&["a.txt"]);
        let transition =
            apply_tool_result(&mut t, "write_file", &result, &StaticProbe::new(["a.txt"]), workdir(), 3);

        assert_eq!(transition.verdict, Verdict::Progress);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.files_verified, vec!["a.txt".to_string()]);
        assert_eq!(t.retry_count, 0);
    }

    #[test]
    fn failed_result_records_the_tool_error() {
        let mut t = task(1, &["a.txt"]);
        let transition = apply_tool_result(
            &mut t,
            "run_command",
            &ToolResult::failure("timeout"),
            &StaticProbe::new(Vec::<&str>::new()),
            workdir(),
            1,
        );
        assert_eq!(transition.verdict, Verdict::ToolFailed);
        assert_eq!(t.error.as_deref(), Some("tool 'run_command' failed: timeout"));
    }

    #[test]
    fn lenient_success_when_nothing_is_expected_or_claimed() {
        let mut t = task(1, &[]);
        let transition = apply_tool_result(
            &mut t,
            "read_file",
            &ToolResult::ok(Map::new()),
            &StaticProbe::new(Vec::<&str>::new()),
            workdir(),
            1,
        );
        assert_eq!(transition.verdict, Verdict::Verified);
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn unverified_completion_claim_fails_the_task() {
        let mut t = task(1, &["x.txt"]);
        let transition = apply_completion_claim(&mut t, &StaticProbe::new(Vec::<&str>::new()), 4);
        assert_eq!(transition.verdict, Verdict::Hallucination);
        assert_eq!(
            t.error.as_deref(),
            Some("claimed complete but unverified (missing: x.txt)")
        );

        let mut t = task(2, &["x.txt"]);
        let transition = apply_completion_claim(&mut t, &StaticProbe::new(["x.txt"]), 4);
        assert_eq!(transition.verdict, Verdict::Verified);
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn rejection_keeps_retries_and_loop_detection_spends_them() {
        let mut t = task(1, &["a.txt"]);
        let rejected = apply_rejection(
            &mut t,
            OrchestrationError::Validation {
                tool: "write_file".to_string(),
                messages: vec!["\"content\" is a required property".to_string()],
            },
            1,
        );
        assert_eq!(rejected.verdict, Verdict::Rejected);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.retry_count, 0);

        let looped = apply_loop_detected(
            &mut t,
            OrchestrationError::LoopDetected {
                task_id: 1,
                tool: "write_file".to_string(),
                count: 5,
            },
        );
        assert_eq!(looped.verdict, Verdict::LoopDetected);
        assert_eq!(t.retry_count, t.max_retries);
        assert!(t.is_terminal());
    }

    #[test]
    fn interrupted_tasks_are_recovered_as_pending() {
        let mut plan = crate::test_support::plan_with(vec![
            task_with_status(1, TaskStatus::Done),
            task_with_status(2, TaskStatus::InProgress),
        ]);
        assert_eq!(recover_interrupted(&mut plan), vec![2]);
        assert_eq!(plan.tasks[1].status, TaskStatus::Pending);
    }
}
