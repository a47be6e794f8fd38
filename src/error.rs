//! Error types for agent-bench operations.
//!
//! Defines the error types shared across subsystems:
//! - Task definitions and task-file loading
//! - Benchmark configuration
//! - Report aggregation and report output
//! - Result persistence sinks
//!
//! Errors local to a single component (agent processes, workspaces, judge
//! scripts) live next to that component.

use std::path::PathBuf;

use thiserror::Error;

/// Errors in a task definition.
///
/// These are configuration errors: the task fails immediately and is never
/// retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Task '{0}' defines neither test_command nor test_script")]
    MissingJudge(String),

    #[error("Task id '{0}' is not usable as a workspace name")]
    InvalidId(String),

    #[error("Task '{task_id}' names judge script '{path}', which cannot be read")]
    UnreadableScript { task_id: String, path: String },
}

/// Errors that abort loading a whole task file.
///
/// Individual malformed lines are skipped with a warning and never surface
/// here.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read task file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No task with id '{0}' found in task file")]
    UnknownTaskId(String),
}

/// Errors that can occur while loading or validating the benchmark configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The requested agent profile is not defined.
    #[error("Agent profile '{0}' is not defined in the benchmark configuration")]
    UnknownAgent(String),

    #[error("Invalid transient error pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors raised by the report aggregator and report writer.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A result arrived for a task that was never registered.
    #[error("Result for unknown task '{0}': register the task with add_task first")]
    UnknownTask(String),

    #[error("Failed to write report to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by result persistence sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let err = TaskError::MissingJudge("t1".to_string());
        assert!(err.to_string().contains("t1"));
        assert!(err.to_string().contains("test_script"));
    }

    #[test]
    fn test_report_error_display() {
        let err = ReportError::UnknownTask("ghost".to_string());
        assert!(err.to_string().contains("ghost"));
        assert!(err.to_string().contains("add_task"));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "BENCH_RETRY_LIMIT".to_string(),
            message: "not a number".to_string(),
        };
        assert!(err.to_string().contains("BENCH_RETRY_LIMIT"));

        let err = ConfigError::UnknownAgent("MISSING".to_string());
        assert!(err.to_string().contains("MISSING"));
    }
}
