//! Deterministic, pure logic shared by the orchestration loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod budget;
pub mod invariants;
pub mod loop_detector;
pub mod path;
pub mod plan;
pub mod selector;
pub mod state_update;
pub mod types;
pub mod verification;
