//! Command-line interface for agent-bench.
//!
//! Provides the `run`, `check`, `humaneval` and `completions` commands and the session that coordinates
//! a benchmark run.

mod commands;
pub mod session;

pub use commands::{parse_cli, run, run_with_cli, Cli};
pub use session::{BenchmarkSession, SessionOutcome};
