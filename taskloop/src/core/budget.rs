//! Consecutive-error accounting for the run loop.

use serde::Serialize;

use crate::core::types::Verdict;
use crate::error::OrchestrationError;

/// Counts failing iterations in a row.
///
/// Independent of per-task `retry_count`: this guards against the whole run
/// stalling, not one stuck task. Any verified progress resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorBudget {
    consecutive: u32,
    limit: u32,
}

impl ErrorBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    /// Fold one iteration's verdict into the counter.
    pub fn record(&mut self, verdict: Verdict) {
        if verdict.is_failure() {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.consecutive >= self.limit
    }

    /// The fatal error to surface once the budget is spent.
    pub fn exhaustion(&self) -> Option<OrchestrationError> {
        self.is_exhausted().then_some(OrchestrationError::FatalExhaustion {
            count: self.consecutive,
            limit: self.limit,
        })
    }
}
