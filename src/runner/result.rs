//! Attempts and per-task results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::judge::Verdict;
use crate::runner::process::truncate;

/// Maximum bytes of agent output kept on an attempt record.
const MAX_ATTEMPT_OUTPUT: usize = 10_000;

/// One try at a task: agent invocation plus judge evaluation.
///
/// Attempts are append-only; once pushed onto a result they are not modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Zero-based attempt index.
    pub index: u32,
    /// Agent exit code; absent when the agent could not be run to completion.
    pub agent_exit_code: Option<i32>,
    /// Captured agent stdout (truncated).
    pub agent_stdout: String,
    /// Captured agent stderr (truncated).
    pub agent_stderr: String,
    /// Judge verdict; absent when the judge was never invoked.
    pub verdict: Option<Verdict>,
    /// Informational judge detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_detail: Option<String>,
    /// Wall time of the attempt in milliseconds.
    pub duration_ms: u64,
    /// Error raised during the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Attempt {
    /// Starts an attempt record.
    pub fn new(index: u32) -> Self {
        Self {
            index,
            agent_exit_code: None,
            agent_stdout: String::new(),
            agent_stderr: String::new(),
            verdict: None,
            judge_detail: None,
            duration_ms: 0,
            error: None,
        }
    }

    /// Records the agent's captured output.
    pub fn with_agent_output(mut self, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.agent_exit_code = Some(exit_code);
        self.agent_stdout = truncate(stdout, MAX_ATTEMPT_OUTPUT);
        self.agent_stderr = truncate(stderr, MAX_ATTEMPT_OUTPUT);
        self
    }

    /// Records the judge verdict.
    pub fn with_verdict(mut self, verdict: Verdict, detail: Option<String>) -> Self {
        self.verdict = Some(verdict);
        self.judge_detail = detail;
        self
    }

    /// Records an error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Sets the attempt duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration_ms(duration);
        self
    }

    /// Returns true if the judge passed this attempt.
    pub fn passed(&self) -> bool {
        self.verdict == Some(Verdict::Pass)
    }
}

/// Final outcome of one task.
///
/// Exactly one result exists per task, even when setup fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// True iff the last attempt passed.
    pub passed: bool,
    /// Attempts beyond the first.
    pub retries: u32,
    /// Total wall time across preparation and all attempts.
    pub duration_ms: u64,
    /// `1 / (index + 1)` of the passing attempt; 0 when never passed.
    pub accuracy: f64,
    /// Last error when the task did not pass; absent after a clean judged FAIL.
    pub error_message: Option<String>,
    /// Attempts in order.
    pub attempts: Vec<Attempt>,
}

impl TaskResult {
    /// Builds the result from the attempts made.
    pub fn from_attempts(task_id: impl Into<String>, attempts: Vec<Attempt>, duration: Duration) -> Self {
        let last = attempts.last();
        let passed = last.is_some_and(Attempt::passed);
        let accuracy = match last {
            Some(attempt) if passed => accuracy_for(attempt.index),
            _ => 0.0,
        };
        let error_message = if passed {
            None
        } else {
            last.and_then(|attempt| attempt.error.clone())
        };

        Self {
            task_id: task_id.into(),
            passed,
            retries: u32::try_from(attempts.len().saturating_sub(1)).unwrap_or(u32::MAX),
            duration_ms: duration_ms(duration),
            accuracy,
            error_message,
            attempts,
        }
    }

    /// A failed result for a task that never reached its first attempt.
    pub fn setup_failure(task_id: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task_id: task_id.into(),
            passed: false,
            retries: 0,
            duration_ms: duration_ms(duration),
            accuracy: 0.0,
            error_message: Some(error.into()),
            attempts: Vec::new(),
        }
    }

    /// Number of attempts made.
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

/// Accuracy credited for passing on attempt `index`.
pub fn accuracy_for(index: u32) -> f64 {
    1.0 / (f64::from(index) + 1.0)
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passing(index: u32) -> Attempt {
        Attempt::new(index)
            .with_agent_output(0, "ok", "")
            .with_verdict(Verdict::Pass, None)
    }

    fn failing(index: u32) -> Attempt {
        Attempt::new(index)
            .with_agent_output(0, "nope", "")
            .with_verdict(Verdict::Fail, Some("judge command exited with code 1".into()))
    }

    #[test]
    fn test_accuracy_for() {
        assert_eq!(accuracy_for(0), 1.0);
        assert_eq!(accuracy_for(1), 0.5);
        assert!((accuracy_for(2) - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pass_first_try() {
        let result = TaskResult::from_attempts("t1", vec![passing(0)], Duration::from_millis(1500));
        assert!(result.passed);
        assert_eq!(result.retries, 0);
        assert_eq!(result.accuracy, 1.0);
        assert_eq!(result.duration_ms, 1500);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_pass_after_retries() {
        let result = TaskResult::from_attempts(
            "t1",
            vec![failing(0), failing(1), passing(2)],
            Duration::from_secs(3),
        );
        assert!(result.passed);
        assert_eq!(result.retries, 2);
        assert!((result.accuracy - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_fail_has_no_error_message() {
        let result = TaskResult::from_attempts("t2", vec![failing(0), failing(1)], Duration::ZERO);
        assert!(!result.passed);
        assert_eq!(result.accuracy, 0.0);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_last_error_is_reported() {
        let errored = Attempt::new(1).with_error("judge script failed: raised at line 1: boom");
        let result = TaskResult::from_attempts("t3", vec![failing(0), errored], Duration::ZERO);
        assert!(!result.passed);
        assert!(result.error_message.unwrap().contains("boom"));
    }

    #[test]
    fn test_setup_failure() {
        let result = TaskResult::setup_failure("t4", "Failed to unpack", Duration::from_millis(3));
        assert!(!result.passed);
        assert_eq!(result.attempt_count(), 0);
        assert_eq!(result.retries, 0);
        assert_eq!(result.error_message.as_deref(), Some("Failed to unpack"));
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = Attempt::new(0).with_agent_output(0, "out", "");
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["verdict"], serde_json::Value::Null);
        assert!(json.get("error").is_none());
    }
}
