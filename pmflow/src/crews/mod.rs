//! Pipeline definitions and runners for each phase of the flow.
//!
//! A crew owns its agents, tasks and prompt inputs. It runs one or more
//! pipelines on an [`EngineContext`](crate::engine::EngineContext) and turns
//! their outputs into typed results; board setup and direct card execution
//! talk to the board client without an agent.

pub mod board_setup;
pub mod execution;
pub mod planning;
pub mod research;
