//! Deterministic normalization of artifact paths.
//!
//! Artifact paths are stored caller-relative (relative to the plan's working
//! directory) with `/` separators, so the same artifact always compares equal.

use std::path::{Component, Path};

/// Normalize a caller-relative artifact path.
///
/// - `./` prefixes and interior `.` components are removed.
/// - `\` separators are folded to `/`.
/// - Absolute paths, `..` traversal and empty paths yield `None`.
pub fn normalize_relative(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() {
        return None;
    }
    let path = Path::new(&unified);

    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(name) => parts.push(name.to_str()?.to_string()),
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Normalize a path a tool claims to have written.
///
/// Absolute paths under `workdir` are rewritten relative to it. Anything that
/// escapes `workdir` yields `None`.
pub fn normalize_claimed(workdir: &Path, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let path = Path::new(trimmed);
    if path.is_absolute() {
        let relative = path.strip_prefix(workdir).ok()?;
        return normalize_relative(relative.to_str()?);
    }
    normalize_relative(trimmed)
}

/// Normalize a list, dropping invalid entries and duplicates (first wins).
pub fn normalize_all<'a, I>(raw: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str>,
{
    let mut kept: Vec<String> = Vec::new();
    let mut rejected = Vec::new();
    for item in raw {
        match normalize_relative(item) {
            Some(path) => {
                if !kept.contains(&path) {
                    kept.push(path);
                }
            }
            None => rejected.push(item.to_string()),
        }
    }
    (kept, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn strips_current_dir_components() {
        assert_eq!(
            normalize_relative("./demo/./src/app.tsx"),
            Some("demo/src/app.tsx".to_string())
        );
        assert_eq!(
            normalize_relative("demo\\src\\page.tsx"),
            Some("demo/src/page.tsx".to_string())
        );
    }

    #[test]
    fn rejects_traversal_absolute_and_empty() {
        assert_eq!(normalize_relative("../etc/passwd"), None);
        assert_eq!(normalize_relative("a/../../b"), None);
        assert_eq!(normalize_relative("/etc/passwd"), None);
        assert_eq!(normalize_relative("  "), None);
        assert_eq!(normalize_relative("./"), None);
    }

    #[test]
    fn claimed_absolute_paths_inside_workdir_become_relative() {
        let workdir = PathBuf::from("/work/project");
        assert_eq!(
            normalize_claimed(&workdir, "/work/project/src/lib.rs"),
            Some("src/lib.rs".to_string())
        );
        assert_eq!(normalize_claimed(&workdir, "/tmp/elsewhere.txt"), None);
        assert_eq!(normalize_claimed(&workdir, "/work/project/../secret.txt"), None);
        assert_eq!(normalize_claimed(&workdir, "/work/project"), None);
        assert_eq!(
            normalize_claimed(&workdir, "./out.txt"),
            Some("out.txt".to_string())
        );
    }

    #[test]
    fn normalize_all_dedups_and_reports_rejects() {
        let (kept, rejected) = normalize_all(["./a.txt", "a.txt", "../b.txt", "c/d.txt"]);
        assert_eq!(kept, vec!["a.txt".to_string(), "c/d.txt".to_string()]);
        assert_eq!(rejected, vec!["../b.txt".to_string()]);
    }
}
