//! I/O helpers: configuration, board and model clients, prompts, schemas,
//! run records.

pub mod board;
pub mod config;
pub mod llm;
pub mod prompt;
pub mod run_store;
pub mod schema;
