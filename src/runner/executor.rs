//! Task runner: drives one task through its attempts.
//!
//! ```text
//! Preparing ─► InvokingAgent ─► Judging ─┬─► Passed
//!                   ▲                    ├─► Retry ─┬─► InvokingAgent
//!                   └────────────────────┘          └─► TerminalFail
//!                                        └─► TerminalFail (non-transient error)
//! ```
//!
//! The runner never returns an error: every failure is folded into the
//! task's [`TaskResult`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::agents::{AgentInvoker, AgentOutput, AgentRequest};
use super::cancel::CancelSignal;
use super::config::{RunConfig, TransientClassifier};
use super::result::{Attempt, TaskResult};
use super::workspace::{Workspace, WorkspaceError};
use crate::error::{ConfigError, TaskError};
use crate::judge::{build_judge, Judge, JudgeContext, JudgeError, Verdict};
use crate::task::Task;

/// What a runner produced for a task.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The task ran to a final result.
    Completed(TaskResult),
    /// The run was cancelled before the task finished; no result exists.
    Cancelled { task_id: String },
}

impl RunOutcome {
    /// Returns the result, if the task completed.
    pub fn into_result(self) -> Option<TaskResult> {
        match self {
            RunOutcome::Completed(result) => Some(result),
            RunOutcome::Cancelled { .. } => None,
        }
    }
}

/// Attempt-loop states after preparation.
#[derive(Debug)]
enum RunnerState {
    InvokingAgent {
        index: u32,
    },
    Judging {
        attempt: Attempt,
        output: AgentOutput,
        started: Instant,
    },
    Retry {
        index: u32,
    },
    Passed,
    TerminalFail,
}

/// Resources owned by a task once preparation succeeded.
struct Prepared {
    workspace: Workspace,
    judge: Box<dyn Judge>,
}

/// Errors that stop a task before its first attempt.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Judge(#[from] JudgeError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Workspace preparation panicked: {0}")]
    Join(String),
}

/// Runs single tasks against the agent.
#[derive(Clone)]
pub struct TaskRunner {
    config: Arc<RunConfig>,
    agent: Arc<dyn AgentInvoker>,
    classifier: TransientClassifier,
    cancel: CancelSignal,
}

impl TaskRunner {
    /// Creates a runner; fails if a transient pattern does not compile.
    pub fn new(config: Arc<RunConfig>, agent: Arc<dyn AgentInvoker>) -> Result<Self, ConfigError> {
        let classifier = config.transient_classifier()?;
        Ok(Self {
            config,
            agent,
            classifier,
            cancel: CancelSignal::never(),
        })
    }

    /// Attaches a cancellation signal.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs `task` to completion unless cancelled first.
    ///
    /// On cancellation the in-flight attempt future is dropped, which kills
    /// any agent or judge process it spawned.
    pub async fn run(&self, task: &Task) -> RunOutcome {
        let mut cancel = self.cancel.clone();
        if cancel.is_cancelled() {
            return RunOutcome::Cancelled {
                task_id: task.id.clone(),
            };
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(task_id = %task.id, "Task cancelled");
                RunOutcome::Cancelled { task_id: task.id.clone() }
            }
            result = self.drive(task) => RunOutcome::Completed(result),
        }
    }

    async fn drive(&self, task: &Task) -> TaskResult {
        let start = Instant::now();
        info!(task_id = %task.id, "Starting task");

        let prepared = match self.prepare(task).await {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Task setup failed");
                return TaskResult::setup_failure(&task.id, e.to_string(), start.elapsed());
            }
        };

        let prompt = self.config.prompt_for(&task.input);
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut state = RunnerState::InvokingAgent { index: 0 };

        loop {
            debug!(task_id = %task.id, state = ?state, "Runner state");
            state = match state {
                RunnerState::InvokingAgent { index } => {
                    self.invoke_agent(task, &prepared, &prompt, index, &mut attempts)
                        .await
                }
                RunnerState::Judging {
                    attempt,
                    output,
                    started,
                } => {
                    self.judge_attempt(task, &prepared, attempt, output, started, &mut attempts)
                        .await
                }
                RunnerState::Retry { index } => {
                    if index >= self.config.retry_limit {
                        RunnerState::TerminalFail
                    } else {
                        info!(task_id = %task.id, attempt = index + 1, "Retrying task");
                        RunnerState::InvokingAgent { index: index + 1 }
                    }
                }
                RunnerState::Passed | RunnerState::TerminalFail => break,
            };
        }

        let result = TaskResult::from_attempts(&task.id, attempts, start.elapsed());
        if result.passed {
            info!(
                task_id = %task.id,
                retries = result.retries,
                accuracy = result.accuracy,
                duration_ms = result.duration_ms,
                "Task passed"
            );
        } else {
            warn!(
                task_id = %task.id,
                retries = result.retries,
                error = result.error_message.as_deref().unwrap_or(""),
                "Task failed"
            );
        }
        result
    }

    /// Resolves the judge and materializes the workspace.
    async fn prepare(&self, task: &Task) -> Result<Prepared, RunnerError> {
        task.validate_id()?;
        let spec = task.judge()?;
        let judge = build_judge(&spec, &self.config.judge)?;

        let datasets_dir = self.config.datasets_dir.clone();
        let task_id = task.id.clone();
        let workspace =
            tokio::task::spawn_blocking(move || Workspace::prepare(&datasets_dir, &task_id))
                .await
                .map_err(|e| RunnerError::Join(e.to_string()))??;

        debug!(
            task_id = %task.id,
            judge = spec.kind(),
            workspace = %workspace.root.display(),
            "Task prepared"
        );
        Ok(Prepared { workspace, judge })
    }

    async fn invoke_agent(
        &self,
        task: &Task,
        prepared: &Prepared,
        prompt: &str,
        index: u32,
        attempts: &mut Vec<Attempt>,
    ) -> RunnerState {
        let started = Instant::now();
        let request = AgentRequest {
            task_id: task.id.clone(),
            attempt: index,
            prompt: prompt.to_string(),
            working_dir: prepared.workspace.root.clone(),
            timeout: self.config.agent_timeout,
        };

        if let Err(e) = self.agent.prepare_attempt(&request).await {
            warn!(task_id = %task.id, attempt = index, error = %e, "Agent pre-attempt command failed");
        }

        match self.agent.invoke(&request).await {
            Ok(output) if output.is_success() => RunnerState::Judging {
                attempt: Attempt::new(index).with_agent_output(
                    output.exit_code,
                    &output.stdout,
                    &output.stderr,
                ),
                output,
                started,
            },
            Ok(output) => {
                warn!(
                    task_id = %task.id,
                    attempt = index,
                    exit_code = output.exit_code,
                    "Agent exited with non-zero status"
                );
                attempts.push(
                    Attempt::new(index)
                        .with_agent_output(output.exit_code, &output.stdout, &output.stderr)
                        .with_error(format!("Agent exited with code {}", output.exit_code))
                        .with_duration(started.elapsed()),
                );
                RunnerState::Retry { index }
            }
            Err(e) => {
                warn!(task_id = %task.id, attempt = index, error = %e, "Agent invocation failed");
                attempts.push(
                    Attempt::new(index)
                        .with_error(e.to_string())
                        .with_duration(started.elapsed()),
                );
                RunnerState::Retry { index }
            }
        }
    }

    async fn judge_attempt(
        &self,
        task: &Task,
        prepared: &Prepared,
        attempt: Attempt,
        output: AgentOutput,
        started: Instant,
        attempts: &mut Vec<Attempt>,
    ) -> RunnerState {
        let index = attempt.index;
        let context = JudgeContext {
            task_id: task.id.clone(),
            input: task.input.clone(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            attempt: index,
            workspace: prepared.workspace.root.clone(),
        };

        let outcome = prepared.judge.evaluate(&context).await;
        debug!(
            task_id = %task.id,
            attempt = index,
            judge = prepared.judge.kind(),
            verdict = %outcome.verdict,
            "Judge finished"
        );

        let mut attempt = attempt.with_verdict(outcome.verdict, outcome.detail.clone());
        if let Some(message) = &outcome.error {
            attempt = attempt.with_error(message.clone());
        }
        attempts.push(attempt.with_duration(started.elapsed()));

        match outcome.verdict {
            Verdict::Pass => RunnerState::Passed,
            Verdict::Fail => {
                if let Some(message) = &outcome.error {
                    warn!(task_id = %task.id, attempt = index, error = %message, "Judge defect");
                }
                RunnerState::Retry { index }
            }
            Verdict::Error => {
                let message = outcome.error.unwrap_or_default();
                if self.classifier.is_transient(&message) {
                    warn!(task_id = %task.id, attempt = index, error = %message, "Transient judge error");
                    RunnerState::Retry { index }
                } else {
                    error!(task_id = %task.id, attempt = index, error = %message, "Judge error");
                    RunnerState::TerminalFail
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::agents::AgentError;
    use crate::runner::cancel::cancel_pair;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Agent that replays scripted outcomes, one per attempt.
    struct ScriptedAgent {
        outcomes: Mutex<Vec<Result<AgentOutput, String>>>,
        calls: AtomicU32,
    }

    impl ScriptedAgent {
        fn new(outcomes: Vec<Result<AgentOutput, String>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU32::new(0),
            })
        }

        fn ok(stdout: &str) -> Result<AgentOutput, String> {
            Ok(AgentOutput::new(0, stdout.into(), String::new(), Duration::ZERO))
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, _request: &AgentRequest) -> Result<AgentOutput, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            let next = if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                outcomes[0].clone()
            };
            next.map_err(AgentError::ExecutionFailed)
        }
    }

    /// Agent that never finishes.
    struct HangingAgent;

    #[async_trait]
    impl AgentInvoker for HangingAgent {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn invoke(&self, _request: &AgentRequest) -> Result<AgentOutput, AgentError> {
            std::future::pending().await
        }
    }

    fn runner(datasets: &TempDir, retry_limit: u32, agent: Arc<dyn AgentInvoker>) -> TaskRunner {
        let config = RunConfig::new(datasets.path()).with_retry_limit(retry_limit);
        TaskRunner::new(Arc::new(config), agent).unwrap()
    }

    async fn completed(runner: &TaskRunner, task: &Task) -> TaskResult {
        runner.run(task).await.into_result().expect("task should complete")
    }

    #[tokio::test]
    async fn test_pass_on_first_attempt() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("hello")]);
        let runner = runner(&datasets, 2, agent.clone());
        let task = Task::with_script("t1", "say hello", "output = 'PASS' if stdout == 'hello' else 'FAIL'");

        let result = completed(&runner, &task).await;
        assert!(result.passed);
        assert_eq!(result.retries, 0);
        assert_eq!(result.accuracy, 1.0);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
        assert!(datasets.path().join("t1").is_dir());
    }

    #[tokio::test]
    async fn test_retry_until_pass() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![
            ScriptedAgent::ok("wrong"),
            ScriptedAgent::ok("right"),
        ]);
        let runner = runner(&datasets, 2, agent);
        let task = Task::with_script("t1", "x", "output = 'PASS' if stdout == 'right' else 'FAIL'");

        let result = completed(&runner, &task).await;
        assert!(result.passed);
        assert_eq!(result.retries, 1);
        assert_eq!(result.accuracy, 0.5);
        assert_eq!(result.attempts[0].verdict, Some(Verdict::Fail));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_retry_limit_bounds_attempts() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("never")]);
        let runner = runner(&datasets, 2, agent.clone());
        let task = Task::with_script("t2", "x", "output = 'FAIL'");

        let result = completed(&runner, &task).await;
        assert!(!result.passed);
        assert_eq!(result.attempt_count(), 3);
        assert_eq!(result.retries, 2);
        assert_eq!(result.accuracy, 0.0);
        assert!(result.error_message.is_none());
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_agent_failure_skips_judge_and_retries() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![
            Err("The server has returned an error".to_string()),
            ScriptedAgent::ok("done"),
        ]);
        let runner = runner(&datasets, 1, agent);
        let task = Task::with_script("t1", "x", "output = 'PASS'");

        let result = completed(&runner, &task).await;
        assert!(result.passed);
        assert_eq!(result.attempts[0].verdict, None);
        assert!(result.attempts[0].error.as_ref().unwrap().contains("server"));
    }

    #[tokio::test]
    async fn test_script_raise_is_retried_and_reported() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("out")]);
        let runner = runner(&datasets, 1, agent.clone());
        let task = Task::with_script("t3", "x", "raise 'judge exploded'");

        let result = completed(&runner, &task).await;
        assert!(!result.passed);
        assert_eq!(result.attempt_count(), 2);
        assert!(result.error_message.unwrap().contains("judge exploded"));
    }

    /// Judge that always reports an infrastructure error.
    struct ErroringJudge(&'static str);

    #[async_trait]
    impl Judge for ErroringJudge {
        fn kind(&self) -> &'static str {
            "erroring"
        }

        async fn evaluate(&self, _context: &JudgeContext) -> crate::judge::JudgeOutcome {
            crate::judge::JudgeOutcome::error(self.0)
        }
    }

    async fn judge_with(runner: &TaskRunner, datasets: &TempDir, message: &'static str) -> (RunnerState, Vec<Attempt>) {
        let prepared = Prepared {
            workspace: Workspace::prepare(datasets.path(), "t1").unwrap(),
            judge: Box::new(ErroringJudge(message)),
        };
        let task = Task::with_command("t1", "x", "true");
        let output = AgentOutput::new(0, "out".into(), String::new(), Duration::ZERO);
        let mut attempts = Vec::new();
        let state = runner
            .judge_attempt(&task, &prepared, Attempt::new(0), output, Instant::now(), &mut attempts)
            .await;
        (state, attempts)
    }

    #[tokio::test]
    async fn test_judge_error_classification() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("out")]);
        let runner = runner(&datasets, 3, agent);

        let (state, attempts) =
            judge_with(&runner, &datasets, "upstream: The server has returned an error").await;
        assert!(matches!(state, RunnerState::Retry { index: 0 }));
        assert_eq!(attempts[0].verdict, Some(Verdict::Error));

        let (state, attempts) = judge_with(&runner, &datasets, "judge command could not run").await;
        assert!(matches!(state, RunnerState::TerminalFail));
        assert_eq!(attempts[0].error.as_deref(), Some("judge command could not run"));
    }

    #[tokio::test]
    async fn test_workspace_failure_fails_without_attempts() {
        let datasets = TempDir::new().unwrap();
        std::fs::write(datasets.path().join("blocker"), "").unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("out")]);
        let config = RunConfig::new(datasets.path().join("blocker"));
        let runner = TaskRunner::new(Arc::new(config), agent.clone()).unwrap();
        let task = Task::with_command("t1", "x", "true");

        let result = completed(&runner, &task).await;
        assert!(!result.passed);
        assert_eq!(result.attempt_count(), 0);
        assert!(result.error_message.unwrap().contains("Failed to create workspace"));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_judge_fails_without_attempts() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("out")]);
        let runner = runner(&datasets, 2, agent.clone());
        let mut task = Task::with_script("t1", "x", "");
        task.test_script = None;

        let result = completed(&runner, &task).await;
        assert!(!result.passed);
        assert_eq!(result.attempt_count(), 0);
        assert!(result.error_message.unwrap().contains("neither"));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_script_syntax_error_fails_without_attempts() {
        let datasets = TempDir::new().unwrap();
        let agent = ScriptedAgent::new(vec![ScriptedAgent::ok("out")]);
        let runner = runner(&datasets, 2, agent.clone());
        let task = Task::with_script("t1", "x", "output = ");

        let result = completed(&runner, &task).await;
        assert_eq!(result.attempt_count(), 0);
        assert!(result.error_message.unwrap().contains("SyntaxError"));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_produces_no_result() {
        let datasets = TempDir::new().unwrap();
        let (handle, signal) = cancel_pair();
        let runner = runner(&datasets, 0, Arc::new(HangingAgent)).with_cancel(signal);
        let task = Task::with_script("t1", "x", "output = 'PASS'");

        let run = tokio::spawn(async move { runner.run(&task).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Cancelled {
                task_id: "t1".to_string()
            }
        );
    }
}
