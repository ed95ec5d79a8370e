//! Orchestrator configuration stored in `taskloop.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::loop_detector::LoopDetector;

/// Orchestrator configuration (TOML).
///
/// Meant to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Iteration ceiling for one run.
    pub max_iterations: u32,

    /// `max_retries` given to every planned task.
    pub max_retries: u32,

    /// Abort once this many iterations in a row have failed.
    pub consecutive_error_limit: u32,

    /// Hard per-call timeout for tools, in seconds.
    pub tool_timeout_secs: u64,

    /// Recent invocations shown to the oracle.
    pub history_window: usize,

    /// Task summaries shown to the oracle.
    pub plan_window: usize,

    pub loop_detection: LoopDetectionConfig,
    pub oracle: OracleConfig,
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopDetectionConfig {
    /// Identical trailing invocations that trigger a warning.
    pub warn_after: usize,
    /// Identical trailing invocations that fail the task for good.
    pub fail_after: usize,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            warn_after: 3,
            fail_after: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Command that reads a prompt on stdin and prints its answer on stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate oracle stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: ["codex", "exec", "--skip-git-repo-check", "-"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            timeout_secs: 300,
            output_limit_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct JournalConfig {
    pub enabled: bool,
    /// Relative to the working directory unless absolute.
    pub dir: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: ".taskloop/runs".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_retries: 3,
            consecutive_error_limit: 4,
            tool_timeout_secs: 30,
            history_window: 5,
            plan_window: 20,
            loop_detection: LoopDetectionConfig::default(),
            oracle: OracleConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.max_retries == 0 {
            return Err(anyhow!("max_retries must be > 0"));
        }
        if self.consecutive_error_limit == 0 {
            return Err(anyhow!("consecutive_error_limit must be > 0"));
        }
        if self.tool_timeout_secs == 0 {
            return Err(anyhow!("tool_timeout_secs must be > 0"));
        }
        if self.history_window == 0 {
            return Err(anyhow!("history_window must be > 0"));
        }
        if self.plan_window == 0 {
            return Err(anyhow!("plan_window must be > 0"));
        }
        let loops = &self.loop_detection;
        if loops.warn_after == 0 || loops.fail_after == 0 {
            return Err(anyhow!("loop_detection thresholds must be > 0"));
        }
        if loops.warn_after > loops.fail_after {
            return Err(anyhow!(
                "loop_detection.warn_after ({}) must not exceed fail_after ({})",
                loops.warn_after,
                loops.fail_after
            ));
        }
        if self.oracle.command.is_empty() || self.oracle.command[0].trim().is_empty() {
            return Err(anyhow!("oracle.command must be a non-empty array"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow!("oracle.timeout_secs must be > 0"));
        }
        if self.oracle.output_limit_bytes == 0 {
            return Err(anyhow!("oracle.output_limit_bytes must be > 0"));
        }
        if self.journal.enabled && self.journal.dir.trim().is_empty() {
            return Err(anyhow!("journal.dir must not be empty when the journal is enabled"));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn loop_detector(&self) -> LoopDetector {
        LoopDetector::new(self.loop_detection.warn_after, self.loop_detection.fail_after)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `Config::default()`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &Config) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    crate::io::write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.consecutive_error_limit, 4);
        assert_eq!(cfg.loop_detector(), LoopDetector::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskloop.toml");
        let mut cfg = Config::default();
        cfg.max_iterations = 25;
        cfg.journal.enabled = false;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskloop.toml");
        fs::write(&path, "max_iterations = 3\n[oracle]\ncommand = [\"my-oracle\"]\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.oracle.command, vec!["my-oracle".to_string()]);
        assert_eq!(cfg.oracle.timeout_secs, 300);
        assert_eq!(cfg.history_window, 5);
    }

    #[test]
    fn zero_limits_and_inverted_thresholds_are_rejected() {
        let mut cfg = Config::default();
        cfg.consecutive_error_limit = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.loop_detection.warn_after = 6;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.oracle.command = vec![" ".to_string()];
        assert!(cfg.validate().is_err());
    }
}
