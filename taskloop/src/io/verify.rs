//! Filesystem-backed artifact probe.
//!
//! Answers from `fs::metadata` directly, never from anything a tool returned.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::verification::ArtifactProbe;

/// Probe rooted at a plan's working directory.
#[derive(Debug, Clone)]
pub struct FsProbe {
    root: PathBuf,
}

impl FsProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path on disk for an artifact, or `None` if it lies outside the root.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let candidate = Path::new(path);
        let relative = if candidate.is_absolute() {
            candidate.strip_prefix(&self.root).ok()?
        } else {
            candidate
        };
        let confined = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        confined.then(|| self.root.join(relative))
    }
}

impl ArtifactProbe for FsProbe {
    #[instrument(skip(self), level = "debug")]
    fn is_present(&self, path: &str) -> bool {
        let Some(resolved) = self.resolve(path) else {
            debug!(path, "artifact outside the working directory");
            return false;
        };
        match fs::metadata(&resolved) {
            Ok(meta) => meta.is_file() && meta.len() > 0,
            Err(err) => {
                debug!(path = %resolved.display(), err = %err, "artifact missing");
                false
            }
        }
    }
}
