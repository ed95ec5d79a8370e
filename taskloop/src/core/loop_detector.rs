//! Repetition detection over recent tool invocations.
//!
//! The history is owned by one orchestrator and passed in explicitly, so
//! concurrent runs never observe each other's invocations.

use std::collections::VecDeque;

use serde::Serialize;

/// One dispatched tool call, attributed to the task it ran for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub task_id: u32,
    pub tool_name: String,
}

impl Invocation {
    pub fn new(task_id: u32, tool_name: impl Into<String>) -> Self {
        Self {
            task_id,
            tool_name: tool_name.into(),
        }
    }
}

/// Bounded ring of invocations, most recent last.
#[derive(Debug, Clone, Default)]
pub struct InvocationHistory {
    entries: VecDeque<Invocation>,
    capacity: usize,
}

impl InvocationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, invocation: Invocation) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(invocation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Invocation> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&Invocation> {
        self.entries.back()
    }

    /// Length of the identical run ending at the most recent entry.
    pub fn trailing_run(&self) -> usize {
        let Some(last) = self.entries.back() else {
            return 0;
        };
        self.entries
            .iter()
            .rev()
            .take_while(|entry| *entry == last)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoopVerdict {
    Clear,
    /// Soft signal: log it, leave the task alone.
    Repeating { count: usize },
    /// Hard signal: the task must be failed without further retries.
    Stuck { count: usize },
}

/// Thresholds for [`LoopVerdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopDetector {
    pub warn_after: usize,
    pub fail_after: usize,
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self {
            warn_after: 3,
            fail_after: 5,
        }
    }
}

impl LoopDetector {
    pub fn new(warn_after: usize, fail_after: usize) -> Self {
        Self {
            warn_after,
            fail_after,
        }
    }

    /// History capacity needed to observe a full failing run.
    pub fn required_capacity(&self, history_window: usize) -> usize {
        history_window.max(self.fail_after)
    }

    pub fn inspect(&self, history: &InvocationHistory) -> LoopVerdict {
        let count = history.trailing_run();
        if count >= self.fail_after {
            LoopVerdict::Stuck { count }
        } else if count >= self.warn_after {
            LoopVerdict::Repeating { count }
        } else {
            LoopVerdict::Clear
        }
    }
}
