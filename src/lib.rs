//! agent-bench: benchmark harness for instruction-following agents.
//!
//! Runs a list of tasks against an external agent process, judges each
//! attempt with an external command or an inline judge script, retries
//! failures up to a limit and aggregates results into a running report.

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod humaneval;
pub mod judge;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod storage;
pub mod task;

// Re-export commonly used error types
pub use error::{ConfigError, LoadError, ReportError, SinkError, TaskError};
