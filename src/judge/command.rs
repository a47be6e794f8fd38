//! External-command judge.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Judge, JudgeContext, JudgeOutcome};
use crate::runner::process::{run_shell, ProcessError, ShellCommand};

/// Judges an attempt by running a command; exit code 0 passes.
///
/// The command runs from the harness's working directory (task files refer
/// to workspaces by relative path). The agent's stdout is piped to its stdin
/// and the attempt context is exported as `BENCH_*` environment variables.
#[derive(Debug, Clone)]
pub struct CommandJudge {
    command: String,
    timeout: Duration,
}

impl CommandJudge {
    /// Creates a command judge.
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Judge for CommandJudge {
    fn kind(&self) -> &'static str {
        "command"
    }

    async fn evaluate(&self, context: &JudgeContext) -> JudgeOutcome {
        info!(task_id = %context.task_id, command = %self.command, "Running judge command");

        let spec = ShellCommand::new(self.command.clone(), self.timeout)
            .with_stdin(context.stdout.clone())
            .with_env("BENCH_TASK_ID", &context.task_id)
            .with_env("BENCH_WORKSPACE", context.workspace.to_string_lossy())
            .with_env("BENCH_ATTEMPT", context.attempt.to_string())
            .with_env("BENCH_AGENT_EXIT_CODE", context.exit_code.to_string());

        match run_shell(&spec).await {
            Ok(output) => {
                debug!(
                    task_id = %context.task_id,
                    exit_code = output.exit_code,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "Judge command finished"
                );
                if output.is_success() {
                    JudgeOutcome::pass()
                } else {
                    JudgeOutcome::fail()
                        .with_detail(format!("judge command exited with code {}", output.exit_code))
                }
            }
            Err(ProcessError::Timeout(d)) => {
                JudgeOutcome::defect(format!("judge command timed out after {}s", d.as_secs()))
            }
            Err(e) => JudgeOutcome::error(format!("judge command could not run: {e}")),
        }
    }
}
