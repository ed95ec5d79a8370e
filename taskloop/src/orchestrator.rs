//! The orchestration loop.
//!
//! Plan once, then select, step and verify until the plan is complete, the
//! iteration ceiling is reached or the consecutive-error budget is spent.
//! Every piece of loop state (history, budget, journal) belongs to one
//! [`Orchestrator`], so independent instances can run side by side.

use std::path::Path;

use tracing::{error, info, instrument, warn};

use crate::agents::planner::TaskPlanner;
use crate::core::budget::ErrorBudget;
use crate::core::loop_detector::InvocationHistory;
use crate::core::plan::TaskPlan;
use crate::core::selector::next_eligible;
use crate::core::state_update::recover_interrupted;
use crate::core::types::{RunResult, Termination};
use crate::io::config::Config;
use crate::io::journal::Journal;
use crate::io::oracle::Oracle;
use crate::io::verify::FsProbe;
use crate::step::{StepConfig, run_step};
use crate::tools::ToolRegistry;

/// Drives one objective from plan to result.
pub struct Orchestrator<O: Oracle> {
    oracle: O,
    registry: ToolRegistry,
    config: Config,
    journal: Option<Journal>,
}

impl<O: Oracle> Orchestrator<O> {
    pub fn new(oracle: O, registry: ToolRegistry, config: Config) -> Self {
        Self {
            oracle,
            registry,
            config,
            journal: None,
        }
    }

    /// Record every iteration under the journal's run directory.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Decompose `objective` into a fresh plan rooted at `workdir`.
    pub fn plan(&self, objective: &str, workdir: &Path) -> TaskPlan {
        TaskPlanner::new(self.config.max_retries, self.registry.catalog()).plan(
            &self.oracle,
            objective,
            workdir,
        )
    }

    /// Plan `objective` and run it with the configured iteration ceiling.
    pub fn execute(&self, objective: &str, workdir: &Path) -> RunResult {
        let mut plan = self.plan(objective, workdir);
        self.run(&mut plan, self.config.max_iterations)
    }

    /// Run the loop over an existing plan, mutating it in place.
    ///
    /// Tasks left IN_PROGRESS by an interrupted run are picked up again.
    #[instrument(skip_all, fields(tasks = plan.tasks.len(), max_iterations = max_iterations))]
    pub fn run(&self, plan: &mut TaskPlan, max_iterations: u32) -> RunResult {
        let step_config = StepConfig::from_config(&self.config);
        let probe = FsProbe::new(&plan.working_directory);
        let mut history = InvocationHistory::with_capacity(
            step_config
                .detector
                .required_capacity(step_config.history_window),
        );
        let mut budget = ErrorBudget::new(self.config.consecutive_error_limit);
        let mut iterations = 0;

        let recovered = recover_interrupted(plan);
        if !recovered.is_empty() {
            warn!(?recovered, "resuming tasks left in progress");
        }

        let termination = loop {
            if plan.is_complete(&probe) {
                break Termination::Success;
            }
            if iterations >= max_iterations {
                info!(iterations, "iteration limit reached");
                break Termination::Partial;
            }
            let Some(index) = next_eligible(plan) else {
                info!("no eligible task left");
                break Termination::Partial;
            };

            let iteration = iterations + 1;
            let outcome = run_step(
                &self.oracle,
                &self.registry,
                &step_config,
                plan,
                index,
                iteration,
                &mut history,
            );
            iterations = iteration;
            budget.record(outcome.verdict());
            info!(
                iteration,
                task_id = outcome.task_id,
                verdict = ?outcome.verdict(),
                status = outcome.status_after.as_str(),
                consecutive_errors = budget.consecutive(),
                "iteration finished"
            );

            if let Some(journal) = &self.journal {
                let record = outcome.into_record(journal.run_id(), budget.consecutive());
                if let Err(err) = journal.write_iteration(&record, &plan.snapshot()) {
                    warn!(err = %format!("{err:#}"), "failed to write iteration record");
                }
            }

            if let Some(err) = budget.exhaustion() {
                error!(err = %err, "aborting run");
                break Termination::Fatal;
            }
        };

        let result = RunResult {
            success: termination == Termination::Success,
            termination,
            task_plan: plan.snapshot(),
            iterations_used: iterations,
            files_created: plan.files_created(),
        };
        info!(
            termination = ?result.termination,
            iterations_used = result.iterations_used,
            completion = plan.completion_percentage(),
            "run finished"
        );

        if let Some(journal) = &self.journal {
            if let Err(err) = journal.write_result(&result) {
                warn!(err = %format!("{err:#}"), "failed to write run result");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TaskStatus;
    use crate::test_support::{
        ScriptedOracle, complete, error_action, plan_reply, workdir, write_file_call,
    };

    fn orchestrator(oracle: ScriptedOracle) -> Orchestrator<ScriptedOracle> {
        let registry = ToolRegistry::with_builtin_tools().expect("registry");
        Orchestrator::new(oracle, registry, Config::default())
    }

    #[test]
    fn completed_plans_stop_before_asking_the_oracle() {
        let dir = workdir();
        let oracle = ScriptedOracle::new()
            .with_plan(plan_reply(&[("Write a", &["a.txt"])]))
            .then_decide(write_file_call("a.txt", "a"))
            .then_decide(complete("should not be asked"));
        let orchestrator = orchestrator(oracle);

        let result = orchestrator.execute("write a.txt", dir.path());
        assert_eq!(result.termination, Termination::Success);
        assert!(result.success);
        assert_eq!(result.iterations_used, 1);
        assert_eq!(result.files_created, vec!["a.txt".to_string()]);
        assert_eq!(orchestrator.oracle.decision_count(), 1);
    }

    #[test]
    fn iteration_ceiling_yields_partial() {
        let dir = workdir();
        let oracle = ScriptedOracle::new()
            .with_plan(plan_reply(&[("Write a", &["a.txt"]), ("Write b", &["b.txt"])]))
            .then_decide(write_file_call("a.txt", "a"));
        let orchestrator = orchestrator(oracle);

        let mut plan = orchestrator.plan("write both", dir.path());
        let result = orchestrator.run(&mut plan, 1);
        assert_eq!(result.termination, Termination::Partial);
        assert!(!result.success);
        assert_eq!(result.iterations_used, 1);
        assert_eq!(plan.tasks[0].status, TaskStatus::Done);
        assert_eq!(plan.tasks[1].status, TaskStatus::Pending);
    }

    #[test]
    fn interrupted_tasks_are_resumed() {
        let dir = workdir();
        let oracle = ScriptedOracle::new()
            .with_plan(plan_reply(&[("Write a", &["a.txt"])]))
            .then_decide(write_file_call("a.txt", "a"));
        let orchestrator = orchestrator(oracle);

        let mut plan = orchestrator.plan("write a.txt", dir.path());
        plan.tasks[0].status = TaskStatus::InProgress;
        let result = orchestrator.run(&mut plan, 3);
        assert_eq!(result.termination, Termination::Success);
    }

    #[test]
    fn success_requires_artifacts_still_on_disk() {
        let dir = workdir();
        let oracle = ScriptedOracle::new()
            .with_plan(plan_reply(&[("Write a", &["a.txt"])]))
            .then_decide(write_file_call("a.txt", "a"));
        let orchestrator = orchestrator(oracle);

        let mut plan = orchestrator.plan("write a.txt", dir.path());
        assert!(orchestrator.run(&mut plan, 1).success);

        std::fs::remove_file(dir.path().join("a.txt")).expect("remove");
        let again = orchestrator.run(&mut plan, 0);
        assert_eq!(again.termination, Termination::Partial);
        assert!(!again.success);
    }

    #[test]
    fn journal_records_each_iteration_and_the_result() {
        let dir = workdir();
        let oracle = ScriptedOracle::new()
            .with_plan(plan_reply(&[("Write a", &["a.txt"])]))
            .then_decide(error_action("unsure"))
            .then_decide(write_file_call("a.txt", "a"));
        let journal = Journal::new(dir.path().join("runs"), "run-test");
        let orchestrator = orchestrator(oracle).with_journal(journal);

        let result = orchestrator.execute("write a.txt", dir.path());
        assert!(result.success);
        assert_eq!(result.iterations_used, 2);

        let run_dir = dir.path().join("runs").join("run-test");
        let first = std::fs::read_to_string(run_dir.join("1").join("record.json")).expect("record 1");
        let first: serde_json::Value = serde_json::from_str(&first).expect("json");
        assert_eq!(first["verdict"], "oracle_error");
        assert_eq!(first["consecutive_errors"], 1);
        assert!(run_dir.join("2").join("plan.after.json").is_file());
        assert!(run_dir.join("result.json").is_file());
    }
}
