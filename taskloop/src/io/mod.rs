//! I/O adapters for the orchestration loop.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod config;
pub mod journal;
pub mod oracle;
pub mod plan_store;
pub mod process;
pub mod prompt;
pub mod verify;

/// Write `contents` via a sibling temp file and rename, creating parent dirs.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
