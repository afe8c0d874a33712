//! LLM crew pipeline that turns a project brief into a populated task board.
//!
//! A project request goes through research, board setup, planning and card
//! execution. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, invariants, research
//!   decision, planning policy, stage state machines). No I/O.
//! - **[`io`]**: Side-effecting operations (board and model HTTP clients,
//!   configuration, prompt rendering, schema validation, run records).
//!
//! Orchestration modules ([`tools`], [`engine`], [`crews`], [`batch`],
//! [`flow`]) coordinate core logic with I/O.

pub mod batch;
pub mod core;
pub mod crews;
pub mod engine;
pub mod exit_codes;
pub mod flow;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
