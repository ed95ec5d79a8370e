//! Task planner: turns the objective into an ordered task plan.
//!
//! The oracle proposes tasks; everything it says is schema-checked and
//! normalized before it becomes part of the plan. Any failure degrades to a
//! single-task plan so a run can always start.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::action::extract_json;
use crate::core::path::normalize_all;
use crate::core::plan::{TaskPlan, TaskState};
use crate::io::oracle::{Oracle, OracleRequest, PlanRequest};
use crate::tools::ToolSpec;

const PLAN_OUTPUT_SCHEMA: &str = include_str!("../../schemas/plan_output.schema.json");

/// Name of the task used when the oracle's plan cannot be used.
pub const FALLBACK_TASK_NAME: &str = "Complete objective";

/// Planner configuration.
#[derive(Debug, Clone)]
pub struct TaskPlanner {
    max_retries: u32,
    tools: Vec<ToolSpec>,
}

/// One task as proposed by the oracle, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedTask {
    pub name: String,
    pub description: String,
    pub files_expected: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanReply {
    Wrapped { tasks: Vec<ReplyEntry> },
    Bare(Vec<ReplyEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplyEntry {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        files_expected: Vec<String>,
    },
}

impl TaskPlanner {
    pub fn new(max_retries: u32, tools: Vec<ToolSpec>) -> Self {
        Self { max_retries, tools }
    }

    /// Decompose `objective` into a plan rooted at `workdir`.
    ///
    /// Never fails; an unusable reply yields [`TaskPlanner::fallback`].
    #[instrument(skip_all, fields(workdir = %workdir.display()))]
    pub fn plan<O: Oracle + ?Sized>(&self, oracle: &O, objective: &str, workdir: &Path) -> TaskPlan {
        let request = OracleRequest::Plan(PlanRequest {
            objective: objective.to_string(),
            working_directory: workdir.to_path_buf(),
            tools: self.tools.clone(),
        });

        let proposed = oracle
            .consult(&request)
            .context("consult oracle for a plan")
            .and_then(|raw| parse_plan_reply(&raw));

        let tasks = match proposed {
            Ok(proposed) => self.assign_ids(proposed),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "planning failed; using single-task fallback");
                return self.fallback(objective, workdir);
            }
        };

        info!(tasks = tasks.len(), "plan created");
        for task in &tasks {
            debug!(id = task.id, name = %task.name, files = ?task.files_expected, "planned task");
        }
        TaskPlan::new(objective, workdir, tasks)
    }

    /// Single-task plan that carries the objective verbatim.
    pub fn fallback(&self, objective: &str, workdir: &Path) -> TaskPlan {
        let task = TaskState::new(
            1,
            FALLBACK_TASK_NAME,
            objective,
            Vec::new(),
            self.max_retries,
        );
        TaskPlan::new(objective, workdir, vec![task])
    }

    fn assign_ids(&self, proposed: Vec<ProposedTask>) -> Vec<TaskState> {
        proposed
            .into_iter()
            .zip(1..)
            .map(|(task, id)| {
                TaskState::new(
                    id,
                    task.name,
                    task.description,
                    task.files_expected,
                    self.max_retries,
                )
            })
            .collect()
    }
}

/// Parse, validate and normalize a planner reply.
///
/// Accepts `{"tasks": [...]}` or a bare array, tolerating prose or code fences
/// around the JSON. Entries may be plain task names.
pub fn parse_plan_reply(raw: &str) -> Result<Vec<ProposedTask>> {
    let value = parse_json(raw)?;
    validate_reply(&value)?;
    let reply: PlanReply = serde_json::from_value(value).context("deserialize plan reply")?;
    let entries = match reply {
        PlanReply::Wrapped { tasks } => tasks,
        PlanReply::Bare(tasks) => tasks,
    };

    let mut tasks = Vec::with_capacity(entries.len());
    for entry in entries {
        let (name, description, files) = match entry {
            ReplyEntry::Name(name) => (name, None, Vec::new()),
            ReplyEntry::Detailed {
                name,
                description,
                files_expected,
            } => (name, description, files_expected),
        };
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(anyhow!("plan reply contains a task with a blank name"));
        }
        let description = description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| name.clone());

        let (files_expected, rejected) = normalize_all(files.iter().map(String::as_str));
        if !rejected.is_empty() {
            warn!(task = %name, ?rejected, "dropping expected files outside the working directory");
        }
        tasks.push(ProposedTask {
            name,
            description,
            files_expected,
        });
    }
    Ok(tasks)
}

fn parse_json(raw: &str) -> Result<Value> {
    if let Ok(value) = serde_json::from_str(raw.trim()) {
        return Ok(value);
    }
    let extracted = extract_json(raw).ok_or_else(|| anyhow!("plan reply contains no JSON"))?;
    debug!("plan reply repaired before parsing");
    serde_json::from_str(&extracted).context("parse plan reply json")
}

fn validate_reply(value: &Value) -> Result<()> {
    let schema: Value =
        serde_json::from_str(PLAN_OUTPUT_SCHEMA).context("parse plan output schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan reply schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
