//! Plan snapshot load/save with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::core::invariants::validate_plan_invariants;
use crate::core::plan::{PlanSnapshot, TaskPlan};

const TASK_PLAN_SCHEMA: &str = include_str!("../../schemas/task_plan.schema.json");

/// Load and validate a plan snapshot from disk (schema + invariants).
pub fn load_plan(path: &Path) -> Result<TaskPlan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    parse_plan(&contents).with_context(|| format!("load plan {}", path.display()))
}

/// Parse and validate a serialized snapshot.
pub fn parse_plan(contents: &str) -> Result<TaskPlan> {
    let value: Value = serde_json::from_str(contents).context("parse plan json")?;
    validate_schema(&value)?;
    let snapshot: PlanSnapshot = serde_json::from_value(value).context("deserialize plan")?;
    let plan = TaskPlan::from_snapshot(snapshot);
    let errors = validate_plan_invariants(&plan);
    if !errors.is_empty() {
        return Err(anyhow!("plan invariants failed: {}", errors.join("; ")));
    }
    Ok(plan)
}

/// Atomically write the plan snapshot (with derived progress fields).
pub fn write_plan(path: &Path, plan: &TaskPlan) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(&plan.snapshot()).context("serialize plan")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}

fn validate_schema(plan: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(TASK_PLAN_SCHEMA).context("parse plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(plan) {
        let messages = compiled
            .iter_errors(plan)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::test_support::{plan_with, task};

    /// Verifies write → load round-trip preserves progress queries.
    #[test]
    fn load_and_write_plan_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".taskloop").join("plan.json");

        let mut done = task(1, &["a.txt"]);
        done.status = TaskStatus::Done;
        done.files_created = vec!["a.txt".to_string()];
        done.files_verified = vec!["a.txt".to_string()];
        let plan = plan_with(vec![done, task(2, &["b.txt"])]);

        write_plan(&path, &plan).expect("write plan");
        let loaded = load_plan(&path).expect("load plan");
        assert_eq!(loaded, plan);
        assert_eq!(loaded.completion_percentage(), 50.0);
        assert_eq!(loaded.files_created(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn schema_violations_are_rejected() {
        let raw = r#"{
            "user_request": "x",
            "created_at": "2024-01-01T00:00:00Z",
            "working_directory": "/w",
            "tasks": [{"id": 1, "name": "t", "description": "d", "status": "SKIPPED"}]
        }"#;
        let err = parse_plan(raw).expect_err("bad status");
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn invariant_violations_are_rejected() {
        let raw = r#"{
            "user_request": "x",
            "created_at": "2024-01-01T00:00:00Z",
            "working_directory": "/w",
            "tasks": [{"id": 1, "name": "t", "description": "d", "status": "FAILED",
                       "retry_count": 5, "max_retries": 3}]
        }"#;
        let err = parse_plan(raw).expect_err("retry overflow");
        assert!(err.to_string().contains("retry_count 5 exceeds max_retries 3"));
    }

    #[test]
    fn minimal_snapshots_load_with_defaults() {
        let raw = r#"{
            "user_request": "x",
            "created_at": "2024-01-01T00:00:00Z",
            "working_directory": "/w",
            "tasks": [{"id": 1, "name": "t", "description": "d", "status": "PENDING"}],
            "progress": {"total": 1, "done": 0, "in_progress": 0, "pending": 1, "failed": 0},
            "completion_percentage": 0.0
        }"#;
        let plan = parse_plan(raw).expect("parse");
        assert_eq!(plan.tasks[0].max_retries, 3);
    }
}
