//! Task plan data model and progress queries.
//!
//! A plan is created once by the planner. Afterwards its shape is fixed: tasks
//! are never added or removed, only their status fields change.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{Progress, TaskStatus};
use crate::core::verification::{ArtifactProbe, check_task};

pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// One planned unit of work and its execution bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Stable id, unique within the plan, assigned from 1.
    pub id: u32,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    /// Caller-relative artifact paths this task must produce.
    #[serde(default)]
    pub files_expected: Vec<String>,
    /// Paths tools claimed to create while working on this task.
    #[serde(default)]
    pub files_created: Vec<String>,
    /// Subset of the verification targets confirmed on disk by the last check.
    #[serde(default)]
    pub files_verified: Vec<String>,
    #[serde(default)]
    pub tool_used: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub iteration_started: Option<u32>,
    #[serde(default)]
    pub iteration_completed: Option<u32>,
}

impl TaskState {
    pub fn new(
        id: u32,
        name: impl Into<String>,
        description: impl Into<String>,
        files_expected: Vec<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            files_expected,
            files_created: Vec::new(),
            files_verified: Vec::new(),
            tool_used: None,
            error: None,
            retry_count: 0,
            max_retries,
            iteration_started: None,
            iteration_completed: None,
        }
    }

    /// FAILED with retries left.
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// DONE, or FAILED with retries exhausted.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Done => true,
            TaskStatus::Failed => !self.can_retry(),
            TaskStatus::Pending | TaskStatus::InProgress => false,
        }
    }

    /// Record a claimed artifact once, preserving claim order.
    pub fn record_created(&mut self, path: String) {
        if !self.files_created.contains(&path) {
            self.files_created.push(path);
        }
    }
}

/// Ordered task list for one objective.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPlan {
    pub user_request: String,
    pub created_at: DateTime<Utc>,
    pub working_directory: PathBuf,
    pub tasks: Vec<TaskState>,
}

impl TaskPlan {
    pub fn new(
        user_request: impl Into<String>,
        working_directory: impl Into<PathBuf>,
        tasks: Vec<TaskState>,
    ) -> Self {
        Self {
            user_request: user_request.into(),
            created_at: Utc::now(),
            working_directory: working_directory.into(),
            tasks,
        }
    }

    pub fn task(&self, id: u32) -> Option<&TaskState> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn task_mut(&mut self, id: u32) -> Option<&mut TaskState> {
        self.tasks.iter_mut().find(|task| task.id == id)
    }

    pub fn progress(&self) -> Progress {
        let mut progress = Progress {
            total: self.tasks.len(),
            ..Progress::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::InProgress => progress.in_progress += 1,
                TaskStatus::Done => progress.done += 1,
                TaskStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }

    /// Share of DONE tasks in percent. An empty plan counts as 100%.
    pub fn completion_percentage(&self) -> f64 {
        let progress = self.progress();
        if progress.total == 0 {
            return 100.0;
        }
        progress.done as f64 / progress.total as f64 * 100.0
    }

    /// Verified artifacts across all tasks, in task order, without duplicates.
    pub fn files_created(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for task in &self.tasks {
            for path in &task.files_verified {
                if !files.contains(path) {
                    files.push(path.clone());
                }
            }
        }
        files
    }

    /// True when every task is DONE and its artifacts still verify right now.
    ///
    /// Verification is re-run on every call; a DONE status alone is not trusted.
    pub fn is_complete<P: ArtifactProbe + ?Sized>(&self, probe: &P) -> bool {
        self.tasks
            .iter()
            .all(|task| task.status == TaskStatus::Done && check_task(probe, task).all_verified())
    }

    /// True when no task can be selected again.
    pub fn all_terminal(&self) -> bool {
        self.tasks.iter().all(TaskState::is_terminal)
    }

    /// Rebuild a plan from its serialized form; derived fields are dropped.
    pub fn from_snapshot(snapshot: PlanSnapshot) -> Self {
        snapshot.into()
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            user_request: self.user_request.clone(),
            created_at: self.created_at,
            working_directory: self.working_directory.clone(),
            tasks: self.tasks.clone(),
            progress: self.progress(),
            completion_percentage: self.completion_percentage(),
            files_created: self.files_created(),
        }
    }

    /// One line per task, for logs and the CLI.
    pub fn summary_lines(&self, max_tasks: usize) -> Vec<String> {
        let mut lines: Vec<String> = self
            .tasks
            .iter()
            .take(max_tasks)
            .map(|task| {
                let mut line = format!(
                    "[{}] {} {} (retries {}/{})",
                    task.status.as_str(),
                    task.id,
                    task.name,
                    task.retry_count,
                    task.max_retries
                );
                if !task.files_verified.is_empty() {
                    line.push_str(&format!(" files: {}", task.files_verified.join(", ")));
                }
                if let Some(err) = &task.error {
                    line.push_str(&format!(" error: {err}"));
                }
                line
            })
            .collect();
        if self.tasks.len() > max_tasks {
            lines.push(format!("... {} more", self.tasks.len() - max_tasks));
        }
        lines
    }
}

/// Serialized form of a plan, with derived progress fields for consumers.
///
/// Derived fields are recomputed from `tasks` when loading; they are carried
/// only so readers do not have to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub user_request: String,
    pub created_at: DateTime<Utc>,
    pub working_directory: PathBuf,
    pub tasks: Vec<TaskState>,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub completion_percentage: f64,
    #[serde(default)]
    pub files_created: Vec<String>,
}

impl From<PlanSnapshot> for TaskPlan {
    fn from(snapshot: PlanSnapshot) -> Self {
        Self {
            user_request: snapshot.user_request,
            created_at: snapshot.created_at,
            working_directory: snapshot.working_directory,
            tasks: snapshot.tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StaticProbe, plan_with, task, task_with_status};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn progress_counts_each_status() {
        let plan = plan_with(vec![
            task_with_status(1, TaskStatus::Done),
            task_with_status(2, TaskStatus::Failed),
            task_with_status(3, TaskStatus::Pending),
            task_with_status(4, TaskStatus::InProgress),
        ]);
        let progress = plan.progress();
        assert_eq!(
            progress,
            Progress {
                total: 4,
                done: 1,
                in_progress: 1,
                pending: 1,
                failed: 1,
            }
        );
        assert_eq!(plan.completion_percentage(), 25.0);
    }

    #[test]
    fn empty_plan_is_fully_complete() {
        let plan = plan_with(Vec::new());
        assert_eq!(plan.completion_percentage(), 100.0);
        assert!(plan.is_complete(&StaticProbe::new(Vec::<&str>::new())));
    }

    #[test]
    fn done_tasks_are_reverified_on_every_completion_check() {
        let mut done = task(1, &["out.txt"]);
        done.status = TaskStatus::Done;
        done.files_verified = vec!["out.txt".to_string()];
        let plan = plan_with(vec![done]);

        assert!(plan.is_complete(&StaticProbe::new(["out.txt"])));
        // Verified once is not verified forever.
        assert!(!plan.is_complete(&StaticProbe::new(Vec::<&str>::new())));
    }

    #[test]
    fn retry_eligibility_depends_on_remaining_retries() {
        let mut t = task_with_status(1, TaskStatus::Failed);
        t.max_retries = 2;
        t.retry_count = 1;
        assert!(t.can_retry());
        assert!(!t.is_terminal());
        t.retry_count = 2;
        assert!(!t.can_retry());
        assert!(t.is_terminal());
    }

    #[test]
    fn files_created_unions_verified_files_in_task_order() {
        let mut a = task(1, &["a.txt", "shared.txt"]);
        a.files_verified = vec!["a.txt".to_string(), "shared.txt".to_string()];
        let mut b = task(2, &["shared.txt", "b.txt"]);
        b.files_verified = vec!["shared.txt".to_string(), "b.txt".to_string()];
        let plan = plan_with(vec![a, b]);
        assert_eq!(plan.files_created(), vec!["a.txt", "shared.txt", "b.txt"]);
    }

    #[test]
    fn snapshot_round_trip_preserves_derived_queries() {
        let mut a = task(1, &["a.txt"]);
        a.status = TaskStatus::Done;
        a.files_created = vec!["a.txt".to_string()];
        a.files_verified = vec!["a.txt".to_string()];
        a.tool_used = Some("write_file".to_string());
        a.iteration_started = Some(1);
        a.iteration_completed = Some(1);
        let mut b = task(2, &["b.txt"]);
        b.status = TaskStatus::Failed;
        b.retry_count = 2;
        b.error = Some("tool 'write_file' failed: disk full".to_string());
        let plan = plan_with(vec![a, b, task(3, &[])]);

        let raw = serde_json::to_string_pretty(&plan.snapshot()).expect("serialize");
        let restored: TaskPlan = serde_json::from_str::<PlanSnapshot>(&raw)
            .expect("deserialize")
            .into();

        assert_eq!(restored.progress(), plan.progress());
        assert_eq!(restored.completion_percentage(), plan.completion_percentage());
        assert_eq!(restored.files_created(), plan.files_created());
        assert_eq!(restored, plan);
    }

    #[test]
    fn missing_optional_task_fields_take_defaults() {
        let raw = r#"{"id": 1, "name": "n", "description": "d", "status": "PENDING"}"#;
        let t: TaskState = serde_json::from_str(raw).expect("parse");
        assert_eq!(t.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(t.retry_count, 0);
        assert!(t.files_expected.is_empty());
    }

    /// `is_complete` holds exactly when every task is DONE and every expected
    /// artifact is present, across randomized statuses and artifact sets.
    #[test]
    fn is_complete_matches_status_and_artifact_oracle() {
        let mut rng = StdRng::seed_from_u64(0x7a5c_100f);
        let statuses = [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Done,
            TaskStatus::Failed,
        ];

        for _ in 0..500 {
            let task_count = rng.gen_range(1..5);
            let mut present: Vec<String> = Vec::new();
            let mut tasks = Vec::new();
            let mut expected_complete = true;

            for id in 1..=task_count {
                let status = if rng.gen_bool(0.7) {
                    TaskStatus::Done
                } else {
                    statuses[rng.gen_range(0..statuses.len())]
                };
                let expected: Vec<String> = (0..rng.gen_range(0..4))
                    .map(|n| format!("t{id}/f{n}.txt"))
                    .collect();
                for path in &expected {
                    if rng.gen_bool(0.8) {
                        present.push(path.clone());
                    } else if status == TaskStatus::Done {
                        expected_complete = false;
                    }
                }
                if status != TaskStatus::Done {
                    expected_complete = false;
                }

                let mut t = TaskState::new(id, format!("task {id}"), "d", expected, 3);
                t.status = status;
                // Stale bookkeeping must not influence the answer.
                t.files_verified = t.files_expected.clone();
                tasks.push(t);
            }

            let plan = plan_with(tasks);
            let probe = StaticProbe::new(present.iter().map(String::as_str));
            assert_eq!(plan.is_complete(&probe), expected_complete);
        }
    }
}
