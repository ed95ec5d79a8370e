//! One orchestration iteration for an already-selected task.
//!
//! Decide, dispatch, verify, then look for repetition. The caller owns task
//! selection, the error budget and the journal.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::agents::decider::{self, Decision};
use crate::core::action::Action;
use crate::core::loop_detector::{Invocation, InvocationHistory, LoopDetector, LoopVerdict};
use crate::core::plan::TaskPlan;
use crate::core::state_update::{
    Transition, apply_completion_claim, apply_loop_detected, apply_oracle_error, apply_rejection,
    apply_tool_failure, apply_tool_result, begin,
};
use crate::core::types::{TaskStatus, ToolResult, Verdict};
use crate::error::OrchestrationError;
use crate::io::config::Config;
use crate::io::journal::IterationRecord;
use crate::io::oracle::{DecisionRequest, Oracle, TaskSummary};
use crate::io::verify::FsProbe;
use crate::tools::{ToolContext, ToolRegistry};

/// Per-iteration knobs, derived from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepConfig {
    pub tool_timeout: Duration,
    pub history_window: usize,
    pub plan_window: usize,
    pub detector: LoopDetector,
}

impl StepConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tool_timeout: config.tool_timeout(),
            history_window: config.history_window,
            plan_window: config.plan_window,
            detector: config.loop_detector(),
        }
    }
}

/// What one iteration did.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub iteration: u32,
    pub task_id: u32,
    pub task_name: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub decision: Decision,
    pub tool_result: Option<ToolResult>,
    pub transition: Transition,
    pub loop_verdict: LoopVerdict,
    pub status_after: TaskStatus,
}

impl StepOutcome {
    pub fn verdict(&self) -> Verdict {
        self.transition.verdict
    }

    pub fn into_record(self, run_id: &str, consecutive_errors: u32) -> IterationRecord {
        let response_shape = self.decision.shape_label();
        let cause = self.transition.error.as_ref().or(self.decision.error.as_ref());
        let error_kind = cause.map(|err| err.kind().to_string());
        let error = match cause {
            Some(err) => Some(err.to_string()),
            None if self.transition.verdict == Verdict::OracleError => {
                self.decision.action.message().map(str::to_string)
            }
            None => None,
        };
        IterationRecord {
            run_id: run_id.to_string(),
            iteration: self.iteration,
            task_id: self.task_id,
            task_name: self.task_name,
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            action: Some(self.decision.action),
            response_shape,
            tool_result: self.tool_result,
            verdict: self.transition.verdict,
            error_kind,
            error,
            loop_verdict: self.loop_verdict,
            status_after: self.status_after,
            consecutive_errors,
        }
    }
}

/// Run one iteration against `plan.tasks[index]`.
#[instrument(skip_all, fields(iteration = iteration, task_id = plan.tasks[index].id))]
pub fn run_step<O: Oracle + ?Sized>(
    oracle: &O,
    registry: &ToolRegistry,
    config: &StepConfig,
    plan: &mut TaskPlan,
    index: usize,
    iteration: u32,
    history: &mut InvocationHistory,
) -> StepOutcome {
    let start = Instant::now();
    let started_at = Utc::now().to_rfc3339();
    begin(&mut plan.tasks[index], iteration);

    let request = decision_request(plan, index, iteration, history, registry, config);
    let decision = decider::decide(oracle, request);

    let workdir = plan.working_directory.clone();
    let probe = FsProbe::new(&workdir);
    let ctx = ToolContext::new(&workdir);
    let task = &mut plan.tasks[index];

    let mut tool_result = None;
    let mut transition = match &decision.action {
        Action::ToolUse {
            tool_name,
            parameters,
            ..
        } => {
            history.push(Invocation::new(task.id, tool_name.clone()));
            match registry.validate(tool_name, parameters) {
                Err(err @ OrchestrationError::Validation { .. }) => {
                    apply_rejection(task, err, iteration)
                }
                Err(err) => apply_tool_failure(task, err, iteration),
                Ok(params) => {
                    info!(tool = %tool_name, "dispatching tool");
                    let result = registry.execute(params, &ctx, config.tool_timeout);
                    let transition =
                        apply_tool_result(task, tool_name, &result, &probe, &workdir, iteration);
                    tool_result = Some(result);
                    transition
                }
            }
        }
        Action::Complete { .. } => apply_completion_claim(task, &probe, iteration),
        Action::Error { message, .. } => {
            let message = message.as_deref().unwrap_or("oracle returned an error action");
            apply_oracle_error(task, message, iteration)
        }
    };

    let loop_verdict = config.detector.inspect(history);
    match loop_verdict {
        LoopVerdict::Stuck { count } if task.status != TaskStatus::Done => {
            let tool = history
                .last()
                .map(|invocation| invocation.tool_name.clone())
                .unwrap_or_default();
            let err = OrchestrationError::LoopDetected {
                task_id: task.id,
                tool,
                count,
            };
            warn!(err = %err, "failing task without retries");
            transition = apply_loop_detected(task, err);
        }
        LoopVerdict::Stuck { count } | LoopVerdict::Repeating { count } => {
            warn!(count, "same tool selected repeatedly for this task");
        }
        LoopVerdict::Clear => {}
    }

    match (&transition.verdict, &transition.error) {
        (Verdict::Hallucination, Some(err)) => warn!(err = %err, "unverified success claim"),
        (verdict, Some(err)) => info!(?verdict, err = %err, "step failed"),
        (verdict, None) => debug!(?verdict, "step finished"),
    }

    StepOutcome {
        iteration,
        task_id: task.id,
        task_name: task.name.clone(),
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
        decision,
        tool_result,
        transition,
        loop_verdict,
        status_after: task.status,
    }
}

fn decision_request(
    plan: &TaskPlan,
    index: usize,
    iteration: u32,
    history: &InvocationHistory,
    registry: &ToolRegistry,
    config: &StepConfig,
) -> DecisionRequest {
    let (start, end) = plan_window(plan.tasks.len(), index, config.plan_window);
    DecisionRequest {
        objective: plan.user_request.clone(),
        working_directory: plan.working_directory.clone(),
        iteration,
        task: TaskSummary::from(&plan.tasks[index]),
        progress: plan.progress(),
        plan: plan.tasks[start..end].iter().map(TaskSummary::from).collect(),
        recent: history.recent(config.history_window),
        tools: registry.catalog(),
    }
}

/// Bounds of at most `window` tasks that contain `index`, biased to centre it.
fn plan_window(len: usize, index: usize, window: usize) -> (usize, usize) {
    let window = window.max(1).min(len);
    let start = index.saturating_sub(window / 2).min(len - window);
    (start, start + window)
}
