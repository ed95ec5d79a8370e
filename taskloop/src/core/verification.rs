//! Artifact verification over an abstract probe.
//!
//! The probe answers "does this artifact exist with content" from outside the
//! tool that produced it. Nothing here caches answers: every call re-probes.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::plan::TaskState;

/// Independent existence check for artifacts.
pub trait ArtifactProbe {
    /// True only if `path` names an existing, non-empty regular file.
    fn is_present(&self, path: &str) -> bool;
}

/// Per-path verification outcome, ordered by path.
///
/// Ephemeral: built by one verification call and never stored on a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationRecord {
    checks: BTreeMap<String, bool>,
}

impl VerificationRecord {
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<bool> {
        self.checks.get(path).copied()
    }

    /// Paths that verified, in `order`.
    pub fn verified_in(&self, order: &[String]) -> Vec<String> {
        order
            .iter()
            .filter(|path| self.get(path) == Some(true))
            .cloned()
            .collect()
    }

    /// Paths that failed verification, in `order`.
    pub fn missing_in(&self, order: &[String]) -> Vec<String> {
        order
            .iter()
            .filter(|path| self.get(path) == Some(false))
            .cloned()
            .collect()
    }

    pub fn verified_count(&self) -> usize {
        self.checks.values().filter(|ok| **ok).count()
    }

    /// True when every checked path verified. Vacuously true when empty.
    pub fn all_verified(&self) -> bool {
        self.checks.values().all(|ok| *ok)
    }
}

/// Which paths a task is judged on: its expectations, or when it has none,
/// whatever the tool claimed to create.
pub fn verification_targets(task: &TaskState) -> &[String] {
    if task.files_expected.is_empty() {
        &task.files_created
    } else {
        &task.files_expected
    }
}

/// Probe every path in `targets`.
pub fn verify_paths<P: ArtifactProbe + ?Sized>(probe: &P, targets: &[String]) -> VerificationRecord {
    let checks = targets
        .iter()
        .map(|path| (path.clone(), probe.is_present(path)))
        .collect();
    VerificationRecord { checks }
}

/// Verify a task's targets without touching the task.
pub fn check_task<P: ArtifactProbe + ?Sized>(probe: &P, task: &TaskState) -> VerificationRecord {
    verify_paths(probe, verification_targets(task))
}

/// Verify a task's targets and record the verified subset in `files_verified`.
pub fn verify_task<P: ArtifactProbe + ?Sized>(probe: &P, task: &mut TaskState) -> VerificationRecord {
    let targets = verification_targets(task).to_vec();
    let record = verify_paths(probe, &targets);
    task.files_verified = record.verified_in(&targets);
    record
}
