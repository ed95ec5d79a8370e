//! Oracle boundary.
//!
//! The [`Oracle`] trait decouples the planner and decider from the actual
//! decision backend (by default `codex exec`). Tests use scripted oracles that
//! return predetermined replies without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::loop_detector::Invocation;
use crate::core::plan::TaskState;
use crate::core::types::{Progress, TaskStatus};
use crate::io::config::OracleConfig;
use crate::io::process::{Limits, run_bounded};
use crate::io::prompt::PromptEngine;
use crate::tools::ToolSpec;

/// Request for an initial decomposition of the objective.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub objective: String,
    pub working_directory: PathBuf,
    pub tools: Vec<ToolSpec>,
}

/// Compact view of one task for the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub files_expected: Vec<String>,
    pub files_verified: Vec<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error: Option<String>,
}

impl From<&TaskState> for TaskSummary {
    fn from(task: &TaskState) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
            description: task.description.clone(),
            status: task.status,
            files_expected: task.files_expected.clone(),
            files_verified: task.files_verified.clone(),
            retry_count: task.retry_count,
            max_retries: task.max_retries,
            error: task.error.clone(),
        }
    }
}

/// Request for the next action on the current task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRequest {
    pub objective: String,
    pub working_directory: PathBuf,
    pub iteration: u32,
    pub task: TaskSummary,
    pub progress: Progress,
    /// Bounded window of the plan around the current task.
    pub plan: Vec<TaskSummary>,
    /// Most recent invocations, oldest first.
    pub recent: Vec<Invocation>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OracleRequest {
    Plan(PlanRequest),
    Decide(DecisionRequest),
}

impl OracleRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            OracleRequest::Plan(_) => "plan",
            OracleRequest::Decide(_) => "decide",
        }
    }

    pub fn working_directory(&self) -> &PathBuf {
        match self {
            OracleRequest::Plan(request) => &request.working_directory,
            OracleRequest::Decide(request) => &request.working_directory,
        }
    }
}

/// Abstraction over decision backends.
pub trait Oracle {
    /// Answer one request with raw response text. Shape is not trusted.
    fn consult(&self, request: &OracleRequest) -> Result<String>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn consult(&self, request: &OracleRequest) -> Result<String> {
        (**self).consult(request)
    }
}

/// Oracle that pipes a rendered prompt into an external command.
pub struct CommandOracle {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl CommandOracle {
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        Ok(Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            prompts: PromptEngine::new()?,
        })
    }
}

impl Oracle for CommandOracle {
    #[instrument(skip_all, fields(kind = request.kind(), program = %self.command[0]))]
    fn consult(&self, request: &OracleRequest) -> Result<String> {
        let prompt = self.prompts.render(request)?;
        info!(prompt_bytes = prompt.len(), "consulting oracle");

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .current_dir(request.working_directory());
        let output = run_bounded(
            cmd,
            Some(prompt.as_bytes()),
            Limits {
                timeout: self.timeout,
                output_bytes: self.output_limit_bytes,
            },
        )
        .with_context(|| format!("run oracle command {}", self.command[0]))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "oracle timed out");
            return Err(anyhow!("oracle timed out after {:?}", self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "oracle failed");
            return Err(anyhow!(
                "oracle failed with status {:?}: {}",
                output.status.code(),
                output.stderr.lossy().trim()
            ));
        }

        let reply = output.stdout.lossy();
        debug!(reply_bytes = reply.len(), "oracle replied");
        Ok(reply)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn plan_request(dir: &std::path::Path) -> OracleRequest {
        OracleRequest::Plan(PlanRequest {
            objective: "write hello.txt".to_string(),
            working_directory: dir.to_path_buf(),
            tools: Vec::new(),
        })
    }

    fn oracle(command: &[&str]) -> CommandOracle {
        CommandOracle::from_config(&OracleConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 5,
            output_limit_bytes: 10_000,
        })
        .expect("oracle")
    }

    #[test]
    fn stdout_of_the_command_is_the_reply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = oracle(&["sh", "-c", "cat >/dev/null; echo '{\"tasks\": []}'"])
            .consult(&plan_request(temp.path()))
            .expect("consult");
        assert_eq!(reply.trim(), "{\"tasks\": []}");
    }

    #[test]
    fn the_prompt_is_fed_on_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let reply = oracle(&["cat"])
            .consult(&plan_request(temp.path()))
            .expect("consult");
        assert!(reply.contains("write hello.txt"));
    }

    #[test]
    fn failing_commands_are_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = oracle(&["sh", "-c", "cat >/dev/null; echo nope >&2; exit 2"])
            .consult(&plan_request(temp.path()))
            .expect_err("fails");
        assert!(err.to_string().contains("nope"));
    }
}
