//! Coordinator for one benchmark run.
//!
//! The session is the single consumer of the scheduler's result stream. For
//! each result it updates the report, records it to the sink and rewrites the
//! report file. It also owns the fail-fast and interrupt handling: both cancel
//! the scheduler, drain whatever results are still produced and write the
//! final report.

use std::future::Future;
use std::path::PathBuf;

use futures::StreamExt;
use tracing::{error, info, warn};

use crate::error::ReportError;
use crate::report::{BenchmarkReport, ReportWriter, Summary};
use crate::runner::{CancelHandle, TaskResult};
use crate::scheduler::Scheduler;
use crate::storage::{BenchmarkRecord, NoopSink, ResultSink};
use crate::task::Task;

/// How a session ended.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Path of the final report.
    pub report_path: PathBuf,
    pub summary: Summary,
    /// Id of the failed task that stopped the run under fail-fast.
    pub fail_fast_task: Option<String>,
    pub interrupted: bool,
}

/// Runs tasks through a scheduler and maintains the report.
pub struct BenchmarkSession {
    report: BenchmarkReport,
    writer: ReportWriter,
    sink: Box<dyn ResultSink>,
    benchmark_file: Option<String>,
    fail_fast: bool,
}

impl BenchmarkSession {
    pub fn new(report: BenchmarkReport, writer: ReportWriter) -> Self {
        Self {
            report,
            writer,
            sink: Box::new(NoopSink),
            benchmark_file: None,
            fail_fast: false,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ResultSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_benchmark_file(mut self, file: impl Into<String>) -> Self {
        self.benchmark_file = Some(file.into());
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn report(&self) -> &BenchmarkReport {
        &self.report
    }

    /// Runs `tasks` on `workers` workers until done, fail-fast or `interrupt`.
    ///
    /// `cancel` must be the handle paired with the scheduler's signal.
    /// Returns an error when the final report cannot be written or when a
    /// result arrives for a task the report does not know; the latter cancels
    /// the run after writing the report collected so far.
    pub async fn execute(
        mut self,
        scheduler: &Scheduler,
        cancel: CancelHandle,
        tasks: Vec<Task>,
        workers: usize,
        interrupt: impl Future<Output = ()>,
    ) -> Result<SessionOutcome, ReportError> {
        for task in &tasks {
            self.report.add_task(task);
        }
        self.write_report();

        let mut results = scheduler.run(tasks, workers);
        tokio::pin!(interrupt);
        let mut interrupted = false;
        let mut fail_fast_task = None;

        loop {
            tokio::select! {
                next = results.next() => {
                    let Some(result) = next else { break };
                    let failed = !result.passed;
                    let task_id = result.task_id.clone();
                    let error_message = result.error_message.clone();
                    if let Err(e) = self.handle_result(result).await {
                        error!(error = %e, "Result rejected by report, cancelling run");
                        cancel.cancel();
                        self.write_report();
                        return Err(e);
                    }

                    if failed && self.fail_fast && fail_fast_task.is_none() {
                        error!(
                            task_id = %task_id,
                            retry_limit = self.report.retry_limit,
                            error_message = error_message.as_deref().unwrap_or("none"),
                            "Task failed after all retries, stopping due to --fail-fast"
                        );
                        cancel.cancel();
                        fail_fast_task = Some(task_id);
                    }
                }
                _ = &mut interrupt, if !interrupted => {
                    warn!("Interrupted, cancelling remaining tasks");
                    cancel.cancel();
                    interrupted = true;
                }
            }
        }

        let report_path = self.writer.write(&self.report)?;
        let summary = self.report.summary().clone();
        info!(
            path = %report_path.display(),
            total = summary.total_results,
            passed = summary.completed,
            failed = summary.failed,
            pass_rate = summary.pass_rate(),
            "Benchmark finished"
        );

        Ok(SessionOutcome {
            report_path,
            summary,
            fail_fast_task,
            interrupted,
        })
    }

    async fn handle_result(&mut self, result: TaskResult) -> Result<(), ReportError> {
        info!(
            task_id = %result.task_id,
            passed = result.passed,
            retries = result.retries,
            duration_ms = result.duration_ms,
            "Task finished"
        );

        let record = self
            .report
            .task(&result.task_id)
            .map(|group| BenchmarkRecord::new(&self.report, group, &result));

        self.report.add_result(result)?;

        if let Some(mut record) = record {
            if let Some(file) = &self.benchmark_file {
                record = record.with_benchmark_file(file.clone());
            }
            if let Err(e) = self.sink.record(&record).await {
                warn!(sink = self.sink.name(), task_id = %record.task_id, error = %e, "Failed to persist result");
            }
        }

        self.write_report();
        Ok(())
    }

    fn write_report(&self) {
        if let Err(e) = self.writer.write(&self.report) {
            warn!(error = %e, "Failed to write intermediate report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{
        cancel_pair, AgentError, AgentInvoker, AgentOutput, AgentRequest, RunConfig, TaskRunner,
    };
    use crate::storage::JsonlSink;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct EchoAgent;

    #[async_trait]
    impl AgentInvoker for EchoAgent {
        fn name(&self) -> &str {
            "echo"
        }

        async fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(AgentOutput::new(0, request.prompt.clone(), String::new(), Duration::ZERO))
        }
    }

    struct Fixture {
        _dir: TempDir,
        datasets: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        Fixture {
            datasets: dir.path().join("datasets"),
            output: dir.path().join("out"),
            _dir: dir,
        }
    }

    fn scheduler(fx: &Fixture) -> (Scheduler, CancelHandle) {
        let config = Arc::new(RunConfig::new(&fx.datasets).with_retry_limit(0));
        let (handle, signal) = cancel_pair();
        let runner = TaskRunner::new(config, Arc::new(EchoAgent)).unwrap();
        (Scheduler::new(runner).with_cancel(signal), handle)
    }

    fn tasks() -> Vec<Task> {
        vec![
            Task::with_script("ok", "say hi", "output = 'PASS' if 'hi' in stdout else 'FAIL'"),
            Task::with_script("bad", "say hi", "output = 'FAIL'"),
            Task::with_script("ok2", "say hi", "output = 'PASS'"),
        ]
    }

    #[tokio::test]
    async fn test_session_writes_report() {
        let fx = fixture();
        let (scheduler, handle) = scheduler(&fx);
        let jsonl = fx.output.join("results.jsonl");
        let session = BenchmarkSession::new(
            BenchmarkReport::new("bench", 0),
            ReportWriter::new(&fx.output),
        )
        .with_sink(Box::new(JsonlSink::open(&jsonl).await.unwrap()))
        .with_benchmark_file("tasks.jsonl");

        let outcome = session
            .execute(&scheduler, handle, tasks(), 1, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(outcome.summary.total_tasks, 3);
        assert_eq!(outcome.summary.completed, 2);
        assert_eq!(outcome.summary.failed, 1);
        assert!(outcome.fail_fast_task.is_none());
        assert!(!outcome.interrupted);

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&outcome.report_path).unwrap()).unwrap();
        assert_eq!(written["summary"]["completed"], 2);

        let lines = std::fs::read_to_string(&jsonl).unwrap();
        assert_eq!(lines.lines().count(), 3);
        assert!(lines.contains("\"benchmark_file\":\"tasks.jsonl\""));
    }

    #[tokio::test]
    async fn test_fail_fast_stops_dispatch() {
        let fx = fixture();
        let (scheduler, handle) = scheduler(&fx);
        let session = BenchmarkSession::new(
            BenchmarkReport::new("bench", 0),
            ReportWriter::new(&fx.output),
        )
        .with_fail_fast(true);

        let outcome = session
            .execute(&scheduler, handle, tasks(), 1, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(outcome.fail_fast_task.as_deref(), Some("bad"));
        // Sequential run: "ok2" is never dispatched after "bad" fails.
        assert_eq!(outcome.summary.total_results, 2);
        assert_eq!(outcome.summary.total_tasks, 3);
    }

    #[tokio::test]
    async fn test_result_for_unknown_task_is_an_error() {
        let fx = fixture();
        let mut session = BenchmarkSession::new(
            BenchmarkReport::new("bench", 0),
            ReportWriter::new(&fx.output),
        );
        session.report.add_task(&tasks()[0]);

        let stray = TaskResult::setup_failure("ghost", "no such task", Duration::ZERO);
        let err = session.handle_result(stray).await.unwrap_err();
        assert!(matches!(err, ReportError::UnknownTask(ref id) if id == "ghost"));
        assert_eq!(session.report().summary().total_results, 0);
    }

    #[tokio::test]
    async fn test_interrupt_still_writes_report() {
        let fx = fixture();
        let (scheduler, handle) = scheduler(&fx);
        let session = BenchmarkSession::new(
            BenchmarkReport::new("bench", 0),
            ReportWriter::new(&fx.output),
        );

        let outcome = session
            .execute(&scheduler, handle, tasks(), 1, std::future::ready(()))
            .await
            .unwrap();

        assert!(outcome.interrupted);
        assert!(outcome.report_path.exists());
        assert!(outcome.summary.total_results <= 3);
    }
}
