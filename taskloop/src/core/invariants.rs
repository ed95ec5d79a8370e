//! Semantic plan invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::plan::TaskPlan;

/// Check semantic invariants not expressible in JSON Schema:
/// - Task ids are unique and sequential from 1, in plan order
/// - `max_retries > 0`
/// - `retry_count <= max_retries`
/// - `files_verified` only names expected or claimed paths
pub fn validate_plan_invariants(plan: &TaskPlan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (position, task) in plan.tasks.iter().enumerate() {
        let label = format!("task {}", task.id);
        if !seen.insert(task.id) {
            errors.push(format!("duplicate id {}", task.id));
        }
        let expected_id = position as u64 + 1;
        if u64::from(task.id) != expected_id {
            errors.push(format!(
                "{label}: id must be {expected_id} at position {position}"
            ));
        }
        if task.max_retries == 0 {
            errors.push(format!("{label}: max_retries must be > 0"));
        }
        if task.retry_count > task.max_retries {
            errors.push(format!(
                "{label}: retry_count {} exceeds max_retries {}",
                task.retry_count, task.max_retries
            ));
        }
        for path in &task.files_verified {
            if !task.files_expected.contains(path) && !task.files_created.contains(path) {
                errors.push(format!(
                    "{label}: verified file '{path}' is neither expected nor created"
                ));
            }
        }
    }

    errors
}
