//! Stable exit codes for pmflow CLI commands.

/// Command succeeded; every card was created.
pub const OK: i32 = 0;
/// Command failed due to invalid input/config, a phase failure or other errors.
pub const INVALID: i32 = 1;
/// The flow finished but at least one card failed.
pub const PARTIAL: i32 = 2;
