//! Tool registry and executor.
//!
//! Tools are opaque callables behind a fixed contract: a JSON parameter object
//! in, a [`ToolResult`] out. The registry owns schema validation, the per-call
//! timeout and panic containment, so nothing a tool does can take down the loop.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use jsonschema::{Validator, validator_for};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::core::path::normalize_claimed;
use crate::core::types::ToolResult;
use crate::error::OrchestrationError;

pub mod command;
pub mod file_ops;

/// Execution context handed to every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workdir: PathBuf,
}

impl ToolContext {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Resolve a tool-supplied path, confined to the working directory.
    ///
    /// Returns the absolute path and its caller-relative form.
    pub fn resolve(&self, raw: &str) -> Result<(PathBuf, String)> {
        let Some(relative) = normalize_claimed(&self.workdir, raw) else {
            bail!("path '{raw}' escapes the working directory");
        };
        Ok((self.workdir.join(&relative), relative))
    }

    /// Like [`ToolContext::resolve`], but `.` and the working directory itself
    /// resolve to the root.
    pub fn resolve_dir(&self, raw: &str) -> Result<(PathBuf, String)> {
        let trimmed = raw.trim();
        if matches!(trimmed, "" | "." | "./") || Path::new(trimmed) == self.workdir {
            return Ok((self.workdir.clone(), ".".to_string()));
        }
        self.resolve(trimmed)
    }
}

/// A named, schema-described operation the oracle can select.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the parameter object.
    fn parameters_schema(&self) -> Value;
    /// Run the tool. Errors and panics are converted into failed results by
    /// the registry.
    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult>;
}

/// Catalog entry shown to the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Parameters that passed the tool's schema.
///
/// Only [`ToolRegistry::validate`] can build one, so [`ToolRegistry::execute`]
/// never sees unchecked input.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    tool: String,
    parameters: Map<String, Value>,
}

impl ValidatedParams {
    pub fn tool(&self) -> &str {
        &self.tool
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }
}

struct Registered {
    tool: Arc<dyn Tool>,
    validator: Validator,
}

/// Named tools with their compiled parameter schemas.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Registered>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the file and command tools.
    pub fn with_builtin_tools() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(file_ops::WriteFile)?;
        registry.register(file_ops::ReadFile)?;
        registry.register(file_ops::EditFile)?;
        registry.register(file_ops::ListDirectory)?;
        registry.register(file_ops::DeleteFile)?;
        registry.register(file_ops::SearchFiles)?;
        registry.register(command::RunCommand)?;
        Ok(registry)
    }

    /// Register a tool under its unique name, compiling its schema once.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let name = tool.name().to_string();
        if name.trim().is_empty() {
            bail!("tool name must not be empty");
        }
        if self.tools.contains_key(&name) {
            bail!("tool '{name}' is already registered");
        }
        let schema = tool.parameters_schema();
        let validator = validator_for(&schema)
            .map_err(|err| anyhow!("invalid schema for tool '{name}': {err}"))?;
        self.tools.insert(
            name,
            Registered {
                tool: Arc::new(tool),
                validator,
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Tool>, OrchestrationError> {
        self.tools
            .get(name)
            .map(|entry| Arc::clone(&entry.tool))
            .ok_or_else(|| OrchestrationError::tool_not_found(name))
    }

    /// Check `params` against the tool's schema.
    ///
    /// A missing tool is a tool-execution error, a schema mismatch a
    /// validation error. Neither runs the tool.
    pub fn validate(
        &self,
        name: &str,
        params: &Map<String, Value>,
    ) -> Result<ValidatedParams, OrchestrationError> {
        let entry = self
            .tools
            .get(name)
            .ok_or_else(|| OrchestrationError::tool_not_found(name))?;
        let instance = Value::Object(params.clone());
        let messages: Vec<String> = entry
            .validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            return Err(OrchestrationError::Validation {
                tool: name.to_string(),
                messages,
            });
        }
        Ok(ValidatedParams {
            tool: name.to_string(),
            parameters: params.clone(),
        })
    }

    /// Run a validated call on a worker thread with a hard timeout.
    ///
    /// Never fails: lookup errors, tool errors, panics and timeouts all come
    /// back as `success: false`. On timeout the worker is left to finish on
    /// its own; its result is discarded. `metadata.tool` and
    /// `metadata.duration_ms` are always set.
    #[instrument(skip_all, fields(tool = params.tool(), timeout_ms = timeout.as_millis() as u64))]
    pub fn execute(&self, params: ValidatedParams, ctx: &ToolContext, timeout: Duration) -> ToolResult {
        let start = Instant::now();
        let ValidatedParams { tool: name, parameters } = params;

        let mut result = match self.lookup(&name) {
            Ok(tool) => run_isolated(tool, ctx.clone(), Value::Object(parameters), timeout),
            Err(err) => ToolResult::failure(err.to_string()),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        result.metadata.insert("tool".to_string(), Value::String(name));
        result
            .metadata
            .insert("duration_ms".to_string(), Value::from(duration_ms));
        debug!(success = result.success, duration_ms, "tool finished");
        result
    }

    /// Name, description and schema of every tool, sorted by name.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|(name, entry)| ToolSpec {
                name: name.clone(),
                description: entry.tool.description().to_string(),
                parameters: entry.tool.parameters_schema(),
            })
            .collect()
    }
}

fn run_isolated(tool: Arc<dyn Tool>, ctx: ToolContext, params: Value, timeout: Duration) -> ToolResult {
    let (tx, rx) = mpsc::channel();
    let worker = thread::Builder::new()
        .name(format!("tool-{}", tool.name()))
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| tool.call(&ctx, &params)));
            // The receiver is gone if the call already timed out.
            let _ = tx.send(outcome);
        });
    if let Err(err) = worker {
        return ToolResult::failure(format!("spawn tool worker: {err}"));
    }

    match rx.recv_timeout(timeout) {
        Ok(Ok(Ok(result))) => result,
        Ok(Ok(Err(err))) => ToolResult::failure(format!("{err:#}")),
        Ok(Err(payload)) => {
            let message = panic_message(payload.as_ref());
            warn!(%message, "tool panicked");
            ToolResult::failure(format!("tool panicked: {message}"))
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!("tool call timed out");
            ToolResult::failure("timeout")
        }
        Err(RecvTimeoutError::Disconnected) => {
            ToolResult::failure("tool worker exited without a result")
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Read an optional string parameter.
pub(crate) fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Read a required string parameter.
pub(crate) fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    str_param(params, key).ok_or_else(|| anyhow!("missing string parameter '{key}'"))
}
