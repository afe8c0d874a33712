//! Deterministic, pure logic shared by the flow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod graph;
pub mod invariants;
pub mod planning;
pub mod research;
pub mod states;
pub mod status_line;
pub mod types;
