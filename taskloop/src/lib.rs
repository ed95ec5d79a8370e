//! Oracle-driven task orchestration.
//!
//! An objective is decomposed into an ordered task plan, then worked through
//! one action per iteration: the oracle proposes, the tool registry executes,
//! and the filesystem decides whether anything actually happened. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, normalization,
//!   verification verdicts, state transitions, loop detection). No I/O.
//! - **[`io`]**: Side effects (oracle process, filesystem probe, plan
//!   persistence, run journal, config).
//! - **[`tools`]**: The tool registry and the built-in file and command tools.
//!
//! [`agents`] talks to the oracle; [`step`] and [`orchestrator`] coordinate
//! everything into the run loop.

pub mod agents;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
