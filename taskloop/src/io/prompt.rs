//! Prompt rendering for the command-backed oracle.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::io::oracle::{DecisionRequest, OracleRequest, PlanRequest};
use crate::tools::ToolSpec;

const PLAN_TEMPLATE: &str = include_str!("prompts/plan.md");
const DECIDE_TEMPLATE: &str = include_str!("prompts/decide.md");

/// Tool entry with its schema pre-rendered as compact JSON.
#[derive(Debug, Clone, Serialize)]
struct ToolContext {
    name: String,
    description: String,
    schema: String,
}

impl ToolContext {
    fn from_spec(spec: &ToolSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            schema: spec.parameters.to_string(),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("plan", PLAN_TEMPLATE)
            .context("load plan template")?;
        env.add_template("decide", DECIDE_TEMPLATE)
            .context("load decide template")?;
        Ok(Self { env })
    }

    pub fn render(&self, request: &OracleRequest) -> Result<String> {
        match request {
            OracleRequest::Plan(plan) => self.render_plan(plan),
            OracleRequest::Decide(decision) => self.render_decision(decision),
        }
    }

    fn render_plan(&self, request: &PlanRequest) -> Result<String> {
        let template = self.env.get_template("plan")?;
        let rendered = template.render(context! {
            objective => request.objective.trim(),
            working_directory => request.working_directory.display().to_string(),
            tools => tool_contexts(&request.tools),
        })?;
        Ok(rendered)
    }

    fn render_decision(&self, request: &DecisionRequest) -> Result<String> {
        let template = self.env.get_template("decide")?;
        let rendered = template.render(context! {
            objective => request.objective.trim(),
            iteration => request.iteration,
            task => &request.task,
            progress => &request.progress,
            plan => &request.plan,
            recent => &request.recent,
            tools => tool_contexts(&request.tools),
        })?;
        Ok(rendered)
    }
}

fn tool_contexts(tools: &[ToolSpec]) -> Vec<ToolContext> {
    tools.iter().map(ToolContext::from_spec).collect()
}
