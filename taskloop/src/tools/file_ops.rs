//! File system tools confined to the working directory.

use std::fs;

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use walkdir::WalkDir;

use crate::core::types::ToolResult;
use crate::tools::{Tool, ToolContext, required_str, str_param};

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Write text to a file, creating parent directories by default.
pub struct WriteFile;

impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file relative to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "minLength": 1},
                "content": {"type": "string"},
                "create_dirs": {"type": "boolean", "default": true}
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let (path, relative) = ctx.resolve(required_str(params, "file_path")?)?;
        let content = required_str(params, "content")?;
        let create_dirs = params
            .get("create_dirs")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        if create_dirs && let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;

        Ok(ToolResult::ok(data(json!({
            "file_path": relative,
            "bytes_written": content.len(),
            "files_created": [relative],
        }))))
    }
}

/// Read a UTF-8 text file.
pub struct ReadFile;

impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file relative to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "minLength": 1}
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let raw = required_str(params, "file_path")?;
        let (path, relative) = ctx.resolve(raw)?;
        if !path.is_file() {
            return Ok(ToolResult::failure(format!("file not found: {raw}")));
        }
        let content =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(ToolResult::ok(data(json!({
            "file_path": relative,
            "size": content.len(),
            "lines": content.lines().count(),
            "content": content,
        }))))
    }
}

/// Replace text inside an existing file.
pub struct EditFile;

impl Tool for EditFile {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace occurrences of `search` with `replace` in an existing file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "minLength": 1},
                "search": {"type": "string", "minLength": 1},
                "replace": {"type": "string"},
                "replace_all": {"type": "boolean", "default": false}
            },
            "required": ["file_path", "search", "replace"],
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let raw = required_str(params, "file_path")?;
        let (path, relative) = ctx.resolve(raw)?;
        let search = required_str(params, "search")?;
        let replace = required_str(params, "replace")?;
        let replace_all = params
            .get("replace_all")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if !path.is_file() {
            return Ok(ToolResult::failure(format!("file not found: {raw}")));
        }
        let original =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let found = original.matches(search).count();
        if found == 0 {
            return Ok(ToolResult::failure(format!("search text not found in {relative}")));
        }
        let (updated, replacements) = if replace_all {
            (original.replace(search, replace), found)
        } else {
            (original.replacen(search, replace, 1), 1)
        };
        fs::write(&path, updated).with_context(|| format!("write {}", path.display()))?;

        Ok(ToolResult::ok(data(json!({
            "file_path": relative,
            "replacements": replacements,
            "files_modified": [relative],
        }))))
    }
}

/// List a directory, optionally recursing into it.
pub struct ListDirectory;

impl Tool for ListDirectory {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List entries of a directory relative to the working directory. Recursive listings contain files only."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory_path": {"type": "string"},
                "recursive": {"type": "boolean", "default": false}
            },
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let raw = str_param(params, "directory_path").unwrap_or(".");
        let (dir, _) = ctx.resolve_dir(raw)?;
        let recursive = params
            .get("recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !dir.is_dir() {
            return Ok(ToolResult::failure(format!("directory not found: {raw}")));
        }

        let mut entries = Vec::new();
        if recursive {
            for entry in WalkDir::new(&dir).min_depth(1) {
                let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if let Ok(relative) = entry.path().strip_prefix(&ctx.workdir) {
                    entries.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        } else {
            for entry in fs::read_dir(&dir).with_context(|| format!("read dir {}", dir.display()))? {
                let entry = entry.with_context(|| format!("read dir {}", dir.display()))?;
                let path = entry.path();
                let Ok(relative) = path.strip_prefix(&ctx.workdir) else {
                    continue;
                };
                let mut name = relative.to_string_lossy().replace('\\', "/");
                if path.is_dir() {
                    name.push('/');
                }
                entries.push(name);
            }
        }
        entries.sort();

        Ok(ToolResult::ok(data(json!({
            "count": entries.len(),
            "files": entries,
        }))))
    }
}

/// Delete a single file.
pub struct DeleteFile;

impl Tool for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file relative to the working directory."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string", "minLength": 1}
            },
            "required": ["file_path"],
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let raw = required_str(params, "file_path")?;
        let (path, relative) = ctx.resolve(raw)?;
        if !path.is_file() {
            return Ok(ToolResult::failure(format!("file not found: {raw}")));
        }
        fs::remove_file(&path).with_context(|| format!("delete {}", path.display()))?;

        Ok(ToolResult::ok(data(json!({
            "file_path": relative,
            "files_deleted": [relative],
        }))))
    }
}

/// Most matches returned by `search_files`; `total` still counts all of them.
const SEARCH_RESULT_LIMIT: usize = 50;

/// Case-insensitive file name search below a directory.
pub struct SearchFiles;

impl Tool for SearchFiles {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Find files whose name contains `query` (case-insensitive), optionally limited to some extensions."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "minLength": 1},
                "root_path": {"type": "string", "default": "."},
                "file_types": {"type": "array", "items": {"type": "string", "minLength": 1}}
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn call(&self, ctx: &ToolContext, params: &Value) -> Result<ToolResult> {
        let query = required_str(params, "query")?.to_lowercase();
        let raw_root = str_param(params, "root_path").unwrap_or(".");
        let (root, _) = ctx.resolve_dir(raw_root)?;
        let extensions: Vec<String> = params
            .get("file_types")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|ext| ext.trim_start_matches('.').to_lowercase())
                    .collect()
            })
            .unwrap_or_default();
        if !root.is_dir() {
            return Ok(ToolResult::failure(format!("directory not found: {raw_root}")));
        }

        let mut matches = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !name.contains(&query) {
                continue;
            }
            if !extensions.is_empty() {
                let ext = entry
                    .path()
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !extensions.contains(&ext) {
                    continue;
                }
            }
            if let Ok(relative) = entry.path().strip_prefix(&ctx.workdir) {
                matches.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }

        let total = matches.len();
        matches.truncate(SEARCH_RESULT_LIMIT);
        Ok(ToolResult::ok(data(json!({
            "matches": matches,
            "total": total,
        }))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(dir: &std::path::Path) -> ToolContext {
        ToolContext::new(dir)
    }

    #[test]
    fn write_file_creates_parents_and_reports_relative_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = WriteFile
            .call(
                &ctx(temp.path()),
                &json!({"file_path": "./nested/out.txt", "content": "0123456789"}),
            )
            .expect("write");

        assert!(result.success);
        assert_eq!(result.files_created(), vec!["nested/out.txt"]);
        assert_eq!(result.data["bytes_written"], json!(10));
        let written = fs::read_to_string(temp.path().join("nested/out.txt")).expect("read");
        assert_eq!(written, "0123456789");
    }

    #[test]
    fn write_file_refuses_to_escape_the_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = WriteFile
            .call(
                &ctx(temp.path()),
                &json!({"file_path": "../escape.txt", "content": "x"}),
            )
            .expect_err("escape");
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn read_file_reports_missing_files_as_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "one\ntwo\n").expect("seed");

        let ok = ReadFile
            .call(&ctx(temp.path()), &json!({"file_path": "a.txt"}))
            .expect("read");
        assert_eq!(ok.data["lines"], json!(2));

        let missing = ReadFile
            .call(&ctx(temp.path()), &json!({"file_path": "b.txt"}))
            .expect("read");
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("file not found: b.txt"));
    }

    #[test]
    fn edit_file_replaces_first_occurrence_by_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "x x x").expect("seed");

        let result = EditFile
            .call(
                &ctx(temp.path()),
                &json!({"file_path": "a.txt", "search": "x", "replace": "y"}),
            )
            .expect("edit");
        assert!(result.success);
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).expect("read"), "y x x");

        let result = EditFile
            .call(
                &ctx(temp.path()),
                &json!({"file_path": "a.txt", "search": "x", "replace": "z", "replace_all": true}),
            )
            .expect("edit");
        assert_eq!(result.data["replacements"], json!(2));

        let result = EditFile
            .call(
                &ctx(temp.path()),
                &json!({"file_path": "a.txt", "search": "q", "replace": "z"}),
            )
            .expect("edit");
        assert!(!result.success);
    }

    #[test]
    fn list_directory_recursive_lists_files_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src/bin")).expect("mkdir");
        fs::write(temp.path().join("src/lib.rs"), "x").expect("seed");
        fs::write(temp.path().join("src/bin/main.rs"), "x").expect("seed");
        fs::write(temp.path().join("README.md"), "x").expect("seed");

        let flat = ListDirectory
            .call(&ctx(temp.path()), &json!({}))
            .expect("list");
        assert_eq!(flat.data["files"], json!(["README.md", "src/"]));

        let deep = ListDirectory
            .call(&ctx(temp.path()), &json!({"directory_path": "src", "recursive": true}))
            .expect("list");
        assert_eq!(deep.data["files"], json!(["src/bin/main.rs", "src/lib.rs"]));
        assert_eq!(deep.data["count"], json!(2));
    }

    #[test]
    fn delete_file_reports_deletions_not_creations() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("old.txt"), "x").expect("seed");

        let result = DeleteFile
            .call(&ctx(temp.path()), &json!({"file_path": "old.txt"}))
            .expect("delete");
        assert!(result.success);
        assert!(result.files_created().is_empty());
        assert_eq!(result.data["files_deleted"], json!(["old.txt"]));
        assert!(!temp.path().join("old.txt").exists());

        let missing = DeleteFile
            .call(&ctx(temp.path()), &json!({"file_path": "old.txt"}))
            .expect("delete");
        assert!(!missing.success);
        assert_eq!(missing.error.as_deref(), Some("file not found: old.txt"));
    }

    #[test]
    fn delete_file_refuses_to_escape_the_workdir() {
        let outer = tempfile::tempdir().expect("tempdir");
        let workdir = outer.path().join("work");
        fs::create_dir(&workdir).expect("mkdir");
        fs::write(outer.path().join("keep.txt"), "x").expect("seed");

        let err = DeleteFile
            .call(&ctx(&workdir), &json!({"file_path": "../keep.txt"}))
            .expect_err("escape");
        assert!(err.to_string().contains("escapes"));
        assert!(outer.path().join("keep.txt").exists());
    }

    #[test]
    fn search_files_matches_names_case_insensitively() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src/handlers")).expect("mkdir");
        fs::write(temp.path().join("src/UserModel.rs"), "x").expect("seed");
        fs::write(temp.path().join("src/handlers/user.ts"), "x").expect("seed");
        fs::write(temp.path().join("README.md"), "x").expect("seed");

        let all = SearchFiles
            .call(&ctx(temp.path()), &json!({"query": "USER"}))
            .expect("search");
        assert_eq!(all.data["matches"], json!(["src/UserModel.rs", "src/handlers/user.ts"]));
        assert_eq!(all.data["total"], json!(2));

        let typed = SearchFiles
            .call(
                &ctx(temp.path()),
                &json!({"query": "user", "root_path": "src", "file_types": [".ts"]}),
            )
            .expect("search");
        assert_eq!(typed.data["matches"], json!(["src/handlers/user.ts"]));
        assert_eq!(typed.data["total"], json!(1));
    }

    #[test]
    fn search_files_caps_matches_but_counts_all() {
        let temp = tempfile::tempdir().expect("tempdir");
        for i in 0..60 {
            fs::write(temp.path().join(format!("note_{i:02}.txt")), "x").expect("seed");
        }

        let result = SearchFiles
            .call(&ctx(temp.path()), &json!({"query": "note"}))
            .expect("search");
        assert_eq!(result.data["matches"].as_array().map(Vec::len), Some(50));
        assert_eq!(result.data["total"], json!(60));
        assert!(result.files_created().is_empty());
    }
}
