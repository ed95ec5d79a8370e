//! Run journal under `.taskloop/runs/<run_id>/`.
//!
//! One directory per iteration with what was decided, what ran and what the
//! plan looked like afterwards, plus the final result. Product output, not
//! diagnostics: tracing goes to stderr, this goes to disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::core::action::Action;
use crate::core::loop_detector::LoopVerdict;
use crate::core::plan::PlanSnapshot;
use crate::core::types::{RunResult, TaskStatus, ToolResult, Verdict};
use crate::io::config::JournalConfig;

/// Everything one iteration did, as written to `record.json`.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub run_id: String,
    pub iteration: u32,
    pub task_id: u32,
    pub task_name: String,
    pub started_at: String,
    pub duration_ms: u64,
    /// Action after normalization; `None` only if the oracle never answered.
    pub action: Option<Action>,
    /// `object`, `batch` or `repaired`.
    pub response_shape: Option<String>,
    pub tool_result: Option<ToolResult>,
    pub verdict: Verdict,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub loop_verdict: LoopVerdict,
    pub status_after: TaskStatus,
    pub consecutive_errors: u32,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub record_path: PathBuf,
    pub plan_after_path: PathBuf,
}

impl IterationPaths {
    pub fn new(run_dir: &Path, iteration: u32) -> Self {
        let dir = run_dir.join(iteration.to_string());
        Self {
            dir: dir.clone(),
            record_path: dir.join("record.json"),
            plan_after_path: dir.join("plan.after.json"),
        }
    }
}

/// Journal for one run.
#[derive(Debug, Clone)]
pub struct Journal {
    run_dir: PathBuf,
    run_id: String,
}

impl Journal {
    pub fn new(dir: impl AsRef<Path>, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            run_dir: dir.as_ref().join(&run_id),
            run_id,
        }
    }

    /// Journal for a fresh run as configured, or `None` when disabled.
    ///
    /// Relative journal dirs are resolved against `workdir`.
    pub fn from_config(workdir: &Path, config: &JournalConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let dir = Path::new(&config.dir);
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            workdir.join(dir)
        };
        Some(Self::new(dir, new_run_id()))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn write_iteration(
        &self,
        record: &IterationRecord,
        plan_after: &PlanSnapshot,
    ) -> Result<IterationPaths> {
        let paths = IterationPaths::new(&self.run_dir, record.iteration);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

        // Write in deterministic order to keep logs stable.
        write_json(&paths.record_path, record)?;
        write_json(&paths.plan_after_path, plan_after)?;
        Ok(paths)
    }

    pub fn write_result(&self, result: &RunResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.run_dir)
            .with_context(|| format!("create run dir {}", self.run_dir.display()))?;
        let path = self.run_dir.join("result.json");
        write_json(&path, result)?;
        Ok(path)
    }
}

pub fn new_run_id() -> String {
    format!("run-{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
