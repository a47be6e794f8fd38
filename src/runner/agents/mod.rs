//! Agent invocation boundary.
//!
//! The task runner talks to the external agent only through
//! [`AgentInvoker`]: it hands over an instruction and a workspace, and gets
//! back captured stdout, stderr and an exit code.

pub mod shell;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

pub use shell::ShellAgent;

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Task being attempted.
    pub task_id: String,
    /// Zero-based attempt index.
    pub attempt: u32,
    /// Instruction for the agent.
    pub prompt: String,
    /// Workspace the agent runs in.
    pub working_dir: PathBuf,
    /// Timeout for the invocation.
    pub timeout: Duration,
}

/// Captured result of an agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    /// Exit code from the agent process.
    pub exit_code: i32,
    /// Standard output captured.
    pub stdout: String,
    /// Standard error captured.
    pub stderr: String,
    /// Execution duration.
    pub duration: Duration,
}

impl AgentOutput {
    /// Creates a new agent output.
    pub fn new(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
        }
    }

    /// Checks if the agent completed successfully (exit code 0).
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for the external agent collaborator.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Returns a short name for logs.
    fn name(&self) -> &str;

    /// Runs before every attempt, e.g. to reset agent state. Defaults to a no-op.
    async fn prepare_attempt(&self, _request: &AgentRequest) -> Result<(), AgentError> {
        Ok(())
    }

    /// Issues the instruction and waits for the agent to finish.
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError>;
}

/// Error type for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
