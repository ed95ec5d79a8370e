//! Shared deterministic types for the orchestration core.
//!
//! These types define stable contracts between the loop, the tool registry and
//! the oracle boundary. They must not depend on external state or I/O.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::plan::PlanSnapshot;

/// Lifecycle status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
        }
    }
}

/// Uniform result of one tool invocation.
///
/// `data` is opaque to the orchestrator except for the optional
/// `files_created` list. After dispatch `metadata` always carries `tool`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            error: Some(error.into()),
            metadata: Map::new(),
        }
    }

    /// Paths the tool claims to have produced (`data.files_created`).
    ///
    /// Non-string entries are ignored; a missing key means no claim.
    pub fn files_created(&self) -> Vec<String> {
        match self.data.get("files_created") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.metadata.get("tool").and_then(Value::as_str)
    }
}

/// Classification of what one iteration did to the selected task.
///
/// Drives both the task transition and the consecutive-error counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Every target artifact verified; task is DONE.
    Verified,
    /// Some expected artifacts verified; task returns to PENDING.
    Progress,
    /// Parameters failed validation; task returns to PENDING.
    Rejected,
    /// Tool missing, raised, timed out or reported failure.
    ToolFailed,
    /// Success claimed without verifiable artifacts.
    Hallucination,
    /// Oracle answered with (or was normalized to) an `error` action.
    OracleError,
    /// Repetition threshold reached; task is terminally FAILED.
    LoopDetected,
}

impl Verdict {
    /// True for outcomes that count toward the consecutive-error limit.
    pub fn is_failure(self) -> bool {
        !matches!(self, Verdict::Verified | Verdict::Progress)
    }
}

/// Progress counts across a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub failed: usize,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Termination {
    /// Plan complete and re-verified.
    Success,
    /// Iterations exhausted or every remaining task terminal.
    Partial,
    /// Consecutive-error limit reached.
    Fatal,
}

/// Result handed back to the caller of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub termination: Termination,
    pub task_plan: PlanSnapshot,
    pub iterations_used: u32,
    pub files_created: Vec<String>,
}
