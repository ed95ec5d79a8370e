//! Stable exit codes for `taskloop` CLI commands.

use crate::core::types::Termination;

/// Command succeeded; for `run`, the plan completed and re-verified.
pub const OK: i32 = 0;
/// Invalid input, config or plan snapshot, or any other error.
pub const INVALID: i32 = 1;
/// `taskloop run` stopped with some tasks incomplete.
pub const PARTIAL: i32 = 2;
/// `taskloop run` aborted on the consecutive-error limit.
pub const FATAL: i32 = 3;

pub fn for_termination(termination: Termination) -> i32 {
    match termination {
        Termination::Success => OK,
        Termination::Partial => PARTIAL,
        Termination::Fatal => FATAL,
    }
}
