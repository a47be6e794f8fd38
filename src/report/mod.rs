//! Benchmark report aggregation.
//!
//! The [`BenchmarkReport`] collects task metadata and results for a single run
//! and keeps a [`Summary`] that is recomputed from scratch after every result.
//! It is owned by the coordinating task only; workers never touch it.
//!
//! # Example
//!
//! ```rust,ignore
//! use agent_bench::report::{BenchmarkReport, ReportWriter};
//!
//! let mut report = BenchmarkReport::new("AI Model Pair Benchmark", 3);
//! report.add_task(&task);
//! report.add_result(result)?;
//!
//! let writer = ReportWriter::new("./benchmark_results");
//! writer.write(&report)?;
//! ```

pub mod git;
pub mod writer;

pub use git::GitInfo;
pub use writer::ReportWriter;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReportError;
use crate::runner::TaskResult;
use crate::task::Task;

/// A task registered in the report together with its results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub task_id: String,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// `command`, `script`, or `none` when the task has no usable judge.
    pub judge: String,
    /// Judge command line or script source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default)]
    pub results: Vec<TaskResult>,
}

impl TaskGroup {
    fn from_task(task: &Task) -> Self {
        let spec = task.judge().ok();
        Self {
            task_id: task.id.clone(),
            input: task.input.clone(),
            description: task.description.clone(),
            tags: task.tags.clone(),
            judge: spec.as_ref().map_or("none", |s| s.kind()).to_string(),
            test: spec.map(|s| s.source().to_string()),
            results: Vec::new(),
        }
    }
}

/// Extremes over passed results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub max_duration_ms: u64,
    /// `+inf` until a result passes; serialized as `null`.
    #[serde(with = "infinite_as_null")]
    pub min_duration_ms: f64,
    pub max_accuracy: f64,
    pub min_accuracy: f64,
}

impl Default for OverallMetrics {
    fn default() -> Self {
        Self {
            max_duration_ms: 0,
            min_duration_ms: f64::INFINITY,
            max_accuracy: 0.0,
            min_accuracy: 1.0,
        }
    }
}

impl OverallMetrics {
    /// Returns the shortest passed duration, if any result passed.
    pub fn min_duration(&self) -> Option<u64> {
        self.min_duration_ms
            .is_finite()
            .then_some(self.min_duration_ms as u64)
    }

    fn observe(&mut self, result: &TaskResult) {
        self.max_duration_ms = self.max_duration_ms.max(result.duration_ms);
        self.min_duration_ms = self.min_duration_ms.min(result.duration_ms as f64);
        self.max_accuracy = self.max_accuracy.max(result.accuracy);
        self.min_accuracy = self.min_accuracy.min(result.accuracy);
    }
}

/// Aggregate statistics over all results of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_tasks: usize,
    pub total_results: usize,
    /// Number of passed results.
    pub completed: usize,
    pub failed: usize,
    /// Averaged over passed results; 0 when none passed.
    pub average_duration_ms: f64,
    /// Averaged over passed results; 0 when none passed.
    pub average_accuracy: f64,
    pub overall_metrics: OverallMetrics,
}

impl Summary {
    fn compute(tasks: &[TaskGroup]) -> Self {
        let mut summary = Summary {
            total_tasks: tasks.len(),
            ..Default::default()
        };
        let mut total_duration = 0u64;
        let mut total_accuracy = 0.0;

        for result in tasks.iter().flat_map(|group| group.results.iter()) {
            summary.total_results += 1;
            if result.passed {
                summary.completed += 1;
                total_duration += result.duration_ms;
                total_accuracy += result.accuracy;
                summary.overall_metrics.observe(result);
            } else {
                summary.failed += 1;
            }
        }

        if summary.completed > 0 {
            summary.average_duration_ms = total_duration as f64 / summary.completed as f64;
            summary.average_accuracy = total_accuracy / summary.completed as f64;
        }
        summary
    }

    /// Percentage of results that passed.
    pub fn pass_rate(&self) -> f64 {
        if self.total_results == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total_results as f64) * 100.0
    }
}

/// The benchmark report of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub benchmark: String,
    pub benchmark_id: Uuid,
    /// Run date, `YYYY-MM-DD`.
    pub date: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub retry_limit: u32,
    #[serde(default)]
    pub model_pairs: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitInfo>,
    pub tasks: Vec<TaskGroup>,
    pub summary: Summary,
}

impl BenchmarkReport {
    /// Creates an empty report.
    pub fn new(benchmark: impl Into<String>, retry_limit: u32) -> Self {
        let started_at = Utc::now();
        Self {
            benchmark: benchmark.into(),
            benchmark_id: Uuid::new_v4(),
            date: started_at.format("%Y-%m-%d").to_string(),
            started_at,
            description: None,
            retry_limit,
            model_pairs: Vec::new(),
            git: None,
            tasks: Vec::new(),
            summary: Summary::default(),
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_model_pairs(mut self, model_pairs: Vec<serde_json::Value>) -> Self {
        self.model_pairs = model_pairs;
        self
    }

    pub fn with_git(mut self, git: GitInfo) -> Self {
        self.git = Some(git);
        self
    }

    /// Registers a task. Registering the same id twice is a no-op.
    pub fn add_task(&mut self, task: &Task) {
        if self.position(&task.id).is_some() {
            return;
        }
        self.tasks.push(TaskGroup::from_task(task));
        self.summary = Summary::compute(&self.tasks);
    }

    /// Attaches a result to its task and recomputes the summary.
    pub fn add_result(&mut self, result: TaskResult) -> Result<(), ReportError> {
        let position = self
            .position(&result.task_id)
            .ok_or_else(|| ReportError::UnknownTask(result.task_id.clone()))?;
        self.tasks[position].results.push(result);
        self.summary = Summary::compute(&self.tasks);
        Ok(())
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    /// Returns the task group for `task_id`.
    pub fn task(&self, task_id: &str) -> Option<&TaskGroup> {
        self.position(task_id).map(|i| &self.tasks[i])
    }

    fn position(&self, task_id: &str) -> Option<usize> {
        self.tasks.iter().position(|group| group.task_id == task_id)
    }

    /// Returns the report as a JSON document.
    pub fn snapshot(&self) -> Result<serde_json::Value, ReportError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Serializes non-finite floats as `null` and reads `null` back as `+inf`.
mod infinite_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Attempt;
    use std::time::Duration;

    fn passed(task_id: &str, index: u32, duration_ms: u64) -> TaskResult {
        let attempts = (0..=index)
            .map(|i| {
                let attempt = Attempt::new(i).with_agent_output(0, "", "");
                if i == index {
                    attempt.with_verdict(crate::judge::Verdict::Pass, None)
                } else {
                    attempt.with_verdict(crate::judge::Verdict::Fail, None)
                }
            })
            .collect();
        TaskResult::from_attempts(task_id, attempts, Duration::from_millis(duration_ms))
    }

    fn failed(task_id: &str) -> TaskResult {
        TaskResult::setup_failure(task_id, "boom", Duration::from_millis(10))
    }

    fn report_with(ids: &[&str]) -> BenchmarkReport {
        let mut report = BenchmarkReport::new("bench", 3);
        for id in ids {
            report.add_task(&Task::with_command(*id, "do it", "true"));
        }
        report
    }

    #[test]
    fn test_empty_summary() {
        let report = report_with(&[]);
        let summary = report.summary();
        assert_eq!(summary.total_tasks, 0);
        assert_eq!(summary.total_results, 0);
        assert_eq!(summary.average_accuracy, 0.0);
        assert_eq!(summary.overall_metrics.max_duration_ms, 0);
        assert!(summary.overall_metrics.min_duration_ms.is_infinite());
        assert_eq!(summary.overall_metrics.min_accuracy, 1.0);
        assert!(summary.overall_metrics.min_duration().is_none());
    }

    #[test]
    fn test_add_task_is_idempotent() {
        let mut report = report_with(&["t1"]);
        report.add_result(passed("t1", 0, 10)).unwrap();
        report.add_task(&Task::with_command("t1", "other", "false"));
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.task("t1").unwrap().results.len(), 1);
        assert_eq!(report.summary().completed, 1);
        assert_eq!(report.task("t1").unwrap().input, "do it");
        assert_eq!(report.summary().total_tasks, 1);
    }

    #[test]
    fn test_unknown_task_rejected() {
        let mut report = report_with(&["t1"]);
        let err = report.add_result(failed("ghost")).unwrap_err();
        assert!(matches!(err, ReportError::UnknownTask(id) if id == "ghost"));
        assert_eq!(report.summary().total_results, 0);
    }

    #[test]
    fn test_summary_over_passed_results() {
        let mut report = report_with(&["t1", "t2", "t3"]);
        report.add_result(passed("t1", 0, 100)).unwrap();
        report.add_result(passed("t2", 1, 300)).unwrap();
        report.add_result(failed("t3")).unwrap();

        let summary = report.summary();
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(summary.total_results, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert!((summary.average_duration_ms - 200.0).abs() < 1e-9);
        assert!((summary.average_accuracy - 0.75).abs() < 1e-9);
        assert_eq!(summary.overall_metrics.max_duration_ms, 300);
        assert_eq!(summary.overall_metrics.min_duration(), Some(100));
        assert_eq!(summary.overall_metrics.max_accuracy, 1.0);
        assert_eq!(summary.overall_metrics.min_accuracy, 0.5);
    }

    #[test]
    fn test_failed_results_leave_metrics_untouched() {
        let mut report = report_with(&["t1"]);
        report.add_result(failed("t1")).unwrap();
        let summary = report.summary();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.average_duration_ms, 0.0);
        assert_eq!(summary.overall_metrics, OverallMetrics::default());
    }

    #[test]
    fn test_snapshot_serializes_infinity_as_null() {
        let report = report_with(&["t1"]);
        let json = report.snapshot().unwrap();
        assert!(json["summary"]["overall_metrics"]["min_duration_ms"].is_null());
        assert_eq!(json["tasks"][0]["task_id"], "t1");
        assert_eq!(json["tasks"][0]["judge"], "command");
    }

    #[test]
    fn test_report_round_trip_keeps_sentinel() {
        let report = report_with(&["t1"]);
        let text = serde_json::to_string(&report).unwrap();
        let parsed: BenchmarkReport = serde_json::from_str(&text).unwrap();
        assert!(parsed.summary.overall_metrics.min_duration_ms.is_infinite());
        assert_eq!(parsed, report);
    }

    #[test]
    fn test_task_without_judge_is_listed() {
        let mut report = report_with(&[]);
        let mut task = Task::with_command("bare", "x", "true");
        task.test_command = None;
        report.add_task(&task);
        assert_eq!(report.task("bare").unwrap().judge, "none");
    }
}
