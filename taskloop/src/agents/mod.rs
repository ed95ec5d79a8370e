//! Oracle-facing roles: decomposing the objective and choosing each step.

pub mod decider;
pub mod planner;
