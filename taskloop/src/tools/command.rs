//! Child-process tool.

use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};

use crate::core::types::ToolResult;
use crate::io::process::{Limits, run_bounded};
use crate::tools::{Tool, ToolContext, required_str};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 600;
const OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Run a program (no shell) inside the working directory.
pub struct RunCommand;

impl Tool for RunCommand {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a program with arguments in the working directory and capture its output. No shell is involved."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "program": {"type": "string", "minLength": 1},
                "args": {"type": "array", "items": {"type": "string"}, "default": []},
                "timeout_secs": {"type": "integer", "minimum": 1, "maximum": MAX_TIMEOUT_SECS}
            },
            "required": ["program"],
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let program = required_str(params, "program")?;
        let args: Vec<&str> = params
            .get("args")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let timeout_secs = params
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        let mut cmd = Command::new(program);
        cmd.args(&args).current_dir(&ctx.workdir);
        let output = run_bounded(
            cmd,
            None,
            Limits {
                timeout: Duration::from_secs(timeout_secs),
                output_bytes: OUTPUT_LIMIT_BYTES,
            },
        )?;

        let mut result = ToolResult::ok(
            json!({
                "stdout": output.stdout.lossy(),
                "stderr": output.stderr.lossy(),
                "exit_code": output.status.code(),
                "timed_out": output.timed_out,
                "stdout_dropped": output.stdout.dropped,
                "stderr_dropped": output.stderr.dropped,
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        );
        if output.timed_out {
            result.success = false;
            result.error = Some("timeout".to_string());
        } else if !output.status.success() {
            result.success = false;
            result.error = Some(match output.status.code() {
                Some(code) => format!("{program} exited with code {code}"),
                None => format!("{program} terminated by signal"),
            });
        }
        Ok(result)
    }
}
