//! Test-only helpers: plan builders, a scripted oracle and closure tools.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};
use serde_json::{Map, Value, json};

use crate::core::plan::{TaskPlan, TaskState};
use crate::core::types::{TaskStatus, ToolResult};
use crate::core::verification::ArtifactProbe;
use crate::io::oracle::{Oracle, OracleRequest};
use crate::tools::{Tool, ToolContext};

/// Fresh, isolated working directory. Removed on drop.
pub fn workdir() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

/// Create a deterministic PENDING task with the given expected files.
pub fn task(id: u32, files_expected: &[&str]) -> TaskState {
    TaskState::new(
        id,
        format!("task {id}"),
        format!("task {id} description"),
        files_expected.iter().map(|path| path.to_string()).collect(),
        3,
    )
}

/// Create a task with no expected files and an explicit status.
pub fn task_with_status(id: u32, status: TaskStatus) -> TaskState {
    let mut task = task(id, &[]);
    task.status = status;
    task
}

/// Wrap tasks in a plan rooted at `/work`.
pub fn plan_with(tasks: Vec<TaskState>) -> TaskPlan {
    TaskPlan::new("test objective", "/work", tasks)
}

/// A successful tool result claiming the given files.
pub fn files_created_result(paths: &[&str]) -> ToolResult {
    let mut data = Map::new();
    data.insert("files_created".to_string(), json!(paths));
    ToolResult::ok(data)
}

/// Probe that answers from a fixed set of present paths.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    present: BTreeSet<String>,
}

impl StaticProbe {
    pub fn new<'a, I>(present: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            present: present.into_iter().map(str::to_string).collect(),
        }
    }
}

impl ArtifactProbe for StaticProbe {
    fn is_present(&self, path: &str) -> bool {
        self.present.contains(path)
    }
}

/// Canonical `tool_use` payload.
pub fn tool_use(tool: &str, parameters: Value) -> String {
    json!({
        "type": "tool_use",
        "tool_name": tool,
        "parameters": parameters,
        "reasoning": format!("use {tool}"),
    })
    .to_string()
}

/// `write_file` payload for `path` with `content`.
pub fn write_file_call(path: &str, content: &str) -> String {
    tool_use("write_file", json!({"file_path": path, "content": content}))
}

pub fn complete(message: &str) -> String {
    json!({"type": "complete", "message": message}).to_string()
}

pub fn error_action(message: &str) -> String {
    json!({"type": "error", "message": message}).to_string()
}

/// Planner reply listing tasks as `(name, files_expected)`.
pub fn plan_reply(tasks: &[(&str, &[&str])]) -> String {
    let tasks: Vec<Value> = tasks
        .iter()
        .map(|(name, files)| {
            json!({
                "name": name,
                "description": format!("{name} (described)"),
                "files_expected": files,
            })
        })
        .collect();
    json!({ "tasks": tasks }).to_string()
}

type Reply = std::result::Result<String, String>;

/// Oracle that serves queued replies and records every request.
///
/// Plan and decision replies are queued separately. An empty queue answers
/// with an error, which the planner and decider both absorb.
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    plan_replies: Mutex<VecDeque<Reply>>,
    decide_replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, reply: impl Into<String>) -> Self {
        push(&self.plan_replies, Ok(reply.into()));
        self
    }

    pub fn with_plan_error(self, message: impl Into<String>) -> Self {
        push(&self.plan_replies, Err(message.into()));
        self
    }

    pub fn then_decide(self, reply: impl Into<String>) -> Self {
        push(&self.decide_replies, Ok(reply.into()));
        self
    }

    pub fn then_decide_error(self, message: impl Into<String>) -> Self {
        push(&self.decide_replies, Err(message.into()));
        self
    }

    /// Queue the same decision reply `times` times.
    pub fn repeat_decide(self, reply: &str, times: usize) -> Self {
        for _ in 0..times {
            push(&self.decide_replies, Ok(reply.to_string()));
        }
        self
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn decision_count(&self) -> usize {
        self.requests()
            .iter()
            .filter(|request| matches!(request, OracleRequest::Decide(_)))
            .count()
    }
}

fn push(queue: &Mutex<VecDeque<Reply>>, reply: Reply) {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push_back(reply);
}

impl Oracle for ScriptedOracle {
    fn consult(&self, request: &OracleRequest) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let queue = match request {
            OracleRequest::Plan(_) => &self.plan_replies,
            OracleRequest::Decide(_) => &self.decide_replies,
        };
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted oracle has no {} reply left", request.kind())),
        }
    }
}

type ToolFn = dyn Fn(&ToolContext, &Value) -> Result<ToolResult> + Send + Sync;

/// Tool backed by a closure.
pub struct FnTool {
    name: String,
    schema: Value,
    call: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: &str, schema: Value, call: F) -> Self
    where
        F: Fn(&ToolContext, &Value) -> Result<ToolResult> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            schema,
            call: Box::new(call),
        }
    }

    /// Tool that always reports success without touching the disk.
    pub fn lying(name: &str, claimed: &[&str]) -> Self {
        let result = files_created_result(claimed);
        Self::new(name, json!({"type": "object"}), move |_, _| Ok(result.clone()))
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        (self.call)(ctx, params)
    }
}
