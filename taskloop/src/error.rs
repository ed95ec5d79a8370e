//! Error taxonomy for the orchestration loop.
//!
//! Plumbing errors (I/O, parsing) travel as `anyhow::Error`. The variants here
//! name the failure classes the loop reacts to; their `Display` text is what
//! ends up in `TaskState::error`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestrationError {
    /// Parameters rejected by the tool's schema. The tool never runs.
    #[error("invalid parameters for tool '{tool}': {}", .messages.join("; "))]
    Validation { tool: String, messages: Vec<String> },

    /// Tool missing from the registry, raised, panicked, timed out or
    /// returned `success: false`.
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Oracle payload could not be normalized into one Action.
    #[error("malformed oracle response: {0}")]
    OracleFormat(String),

    /// Success was claimed but the artifacts are not on disk.
    #[error("{detail} (missing: {})", .missing.join(", "))]
    Hallucination { detail: String, missing: Vec<String> },

    /// Same tool selected for the same task too many times in a row.
    #[error("loop detected: tool '{tool}' selected {count} times in a row for task {task_id}")]
    LoopDetected {
        task_id: u32,
        tool: String,
        count: usize,
    },

    /// Consecutive-error budget spent; the run is aborted.
    #[error("aborting after {count} consecutive errors (limit {limit})")]
    FatalExhaustion { count: u32, limit: u32 },
}

impl OrchestrationError {
    pub fn tool_not_found(tool: &str) -> Self {
        Self::ToolExecution {
            tool: tool.to_string(),
            message: "tool not found".to_string(),
        }
    }

    pub fn reported_success(missing: Vec<String>) -> Self {
        Self::Hallucination {
            detail: "reported success with no verifiable artifacts".to_string(),
            missing,
        }
    }

    pub fn claimed_complete(missing: Vec<String>) -> Self {
        Self::Hallucination {
            detail: "claimed complete but unverified".to_string(),
            missing,
        }
    }

    /// Stable snake_case label used in journal records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::ToolExecution { .. } => "tool_execution",
            Self::OracleFormat(_) => "oracle_format",
            Self::Hallucination { .. } => "hallucination",
            Self::LoopDetected { .. } => "loop_detected",
            Self::FatalExhaustion { .. } => "fatal_exhaustion",
        }
    }
}
