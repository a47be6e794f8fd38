//! Shell-command agent adapter.
//!
//! Runs any command-line agent that takes its instruction as a single
//! argument, e.g. `@2501 '<instruction>'`, inside the task workspace.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{AgentError, AgentInvoker, AgentOutput, AgentRequest};
use crate::runner::process::{run_shell, ProcessError, ShellCommand};

/// Placeholder replaced by the quoted prompt in a command template.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Adapter for CLI agents driven through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellAgent {
    /// Command template. The quoted prompt replaces `{prompt}`, or is
    /// appended when the placeholder is absent.
    command: String,
    /// Command run before every attempt to reset agent state.
    flush_command: Option<String>,
    /// Extra environment variables.
    env_vars: Vec<(String, String)>,
}

impl ShellAgent {
    /// Creates a new shell agent with the given command template.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            flush_command: None,
            env_vars: Vec::new(),
        }
    }

    /// Sets the per-attempt flush command.
    pub fn with_flush_command(mut self, command: impl Into<String>) -> Self {
        self.flush_command = Some(command.into());
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Builds the shell command line for a prompt.
    pub fn command_line(&self, prompt: &str) -> String {
        let quoted = shell_quote(prompt);
        if self.command.contains(PROMPT_PLACEHOLDER) {
            self.command.replace(PROMPT_PLACEHOLDER, &quoted)
        } else {
            format!("{} {}", self.command, quoted)
        }
    }

    fn shell_command(&self, line: String, request: &AgentRequest) -> ShellCommand {
        let mut spec = ShellCommand::new(line, request.timeout)
            .in_dir(&request.working_dir)
            .with_env("BENCH_TASK_ID", &request.task_id)
            .with_env("BENCH_ATTEMPT", request.attempt.to_string());
        for (key, value) in &self.env_vars {
            spec = spec.with_env(key, value);
        }
        spec
    }
}

#[async_trait]
impl AgentInvoker for ShellAgent {
    fn name(&self) -> &str {
        &self.command
    }

    async fn prepare_attempt(&self, request: &AgentRequest) -> Result<(), AgentError> {
        let Some(flush) = &self.flush_command else {
            return Ok(());
        };

        let output = run_shell(&self.shell_command(flush.clone(), request))
            .await
            .map_err(map_process_error)?;
        if !output.is_success() {
            // A failed flush is not fatal: the attempt itself decides.
            warn!(
                task_id = %request.task_id,
                exit_code = output.exit_code,
                stderr = %output.stderr,
                "Agent flush command failed"
            );
        }
        Ok(())
    }

    async fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError> {
        let line = self.command_line(&request.prompt);
        info!(
            task_id = %request.task_id,
            attempt = request.attempt,
            dir = %request.working_dir.display(),
            "Invoking agent"
        );
        debug!(command = %line, "Agent command line");

        let output = run_shell(&self.shell_command(line, request))
            .await
            .map_err(map_process_error)?;

        debug!(
            task_id = %request.task_id,
            exit_code = output.exit_code,
            "Agent completed"
        );

        Ok(AgentOutput::new(
            output.exit_code,
            output.stdout,
            output.stderr,
            output.duration,
        ))
    }
}

fn map_process_error(err: ProcessError) -> AgentError {
    match err {
        ProcessError::Timeout(d) => AgentError::Timeout(d),
        ProcessError::Io(e) => AgentError::Io(e),
        other => AgentError::ExecutionFailed(other.to_string()),
    }
}

/// Quotes a string as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(dir: &std::path::Path, prompt: &str) -> AgentRequest {
        AgentRequest {
            task_id: "t1".to_string(),
            attempt: 0,
            prompt: prompt.to_string(),
            working_dir: dir.to_path_buf(),
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("don't"), "'don'\\''t'");
    }

    #[test]
    fn test_command_line_appends_prompt() {
        let agent = ShellAgent::new("@2501");
        assert_eq!(agent.command_line("list files"), "@2501 'list files'");
    }

    #[test]
    fn test_command_line_placeholder() {
        let agent = ShellAgent::new("agent run --prompt {prompt} --quiet");
        assert_eq!(
            agent.command_line("x"),
            "agent run --prompt 'x' --quiet"
        );
    }

    #[tokio::test]
    async fn test_invoke_echo_agent() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = ShellAgent::new("echo");
        let output = agent.invoke(&request(dir.path(), "it's ok")).await.unwrap();
        assert!(output.is_success());
        assert_eq!(output.stdout, "it's ok");
    }

    #[tokio::test]
    async fn test_invoke_runs_in_workspace() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = ShellAgent::new("touch marker.txt; echo $BENCH_TASK_ID {prompt}");
        let output = agent.invoke(&request(dir.path(), "go")).await.unwrap();
        assert_eq!(output.stdout, "t1 go");
        assert!(dir.path().join("marker.txt").exists());
    }

    #[tokio::test]
    async fn test_invoke_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = ShellAgent::new("sleep 5; echo");
        let mut req = request(dir.path(), "slow");
        req.timeout = Duration::from_millis(200);
        let err = agent.invoke(&req).await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_flush_failure_is_not_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let agent = ShellAgent::new("echo").with_flush_command("exit 1");
        assert!(agent.prepare_attempt(&request(dir.path(), "x")).await.is_ok());
    }
}
