//! Pass/fail judges for task attempts.
//!
//! A judge inspects one attempt's agent output and returns a [`Verdict`].
//! Two variants exist:
//!
//! - [`CommandJudge`]: runs an external command; exit code 0 passes.
//! - [`ScriptJudge`]: evaluates an inline judge script in a fresh,
//!   capability-scoped interpreter that must set `output` to `PASS` or `FAIL`.
//!
//! # Verdict semantics
//!
//! | Situation                                   | Verdict | `error` set |
//! |---------------------------------------------|---------|-------------|
//! | command exits 0 / script sets `PASS`        | Pass    | no          |
//! | command exits non-zero / script sets `FAIL` | Fail    | no          |
//! | judge times out, script raises, no `output` | Fail    | yes         |
//! | judge cannot be launched or crashes         | Error   | yes         |
//!
//! The task runner retries `Fail`; `Error` is retried only when classified as
//! transient.

pub mod command;
pub mod script;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::task::JudgeSpec;

pub use command::CommandJudge;
pub use script::{ScriptError, ScriptJudge, ScriptLimits};

/// Default timeout for external judge commands.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Default timeout for judge scripts.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Outcome class of a judged attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail => write!(f, "fail"),
            Verdict::Error => write!(f, "error"),
        }
    }
}

/// Everything a judge may look at for one attempt.
#[derive(Debug, Clone)]
pub struct JudgeContext {
    pub task_id: String,
    /// Instruction issued to the agent.
    pub input: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Zero-based attempt index.
    pub attempt: u32,
    /// Task workspace root.
    pub workspace: PathBuf,
}

/// Result of one judge evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeOutcome {
    pub verdict: Verdict,
    /// Informational detail for logs and the report.
    pub detail: Option<String>,
    /// Set when the verdict stems from a judge defect or infrastructure
    /// failure rather than a clean decision.
    pub error: Option<String>,
}

impl JudgeOutcome {
    /// A clean pass.
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            detail: None,
            error: None,
        }
    }

    /// A clean, judged failure.
    pub fn fail() -> Self {
        Self {
            verdict: Verdict::Fail,
            detail: None,
            error: None,
        }
    }

    /// A failure caused by a judge defect: raised error, timeout, missing output.
    pub fn defect(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            detail: None,
            error: Some(message.into()),
        }
    }

    /// The judge itself could not run.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            detail: None,
            error: Some(message.into()),
        }
    }

    /// Attaches an informational detail.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns true for a pass verdict.
    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Timeouts and limits applied to judges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Timeout for external judge commands.
    pub command_timeout: Duration,
    /// Timeout for judge scripts.
    pub script_timeout: Duration,
    /// Interpreter limits for judge scripts.
    pub script_limits: ScriptLimits,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            script_timeout: DEFAULT_SCRIPT_TIMEOUT,
            script_limits: ScriptLimits::default(),
        }
    }
}

/// Trait implemented by judge variants.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Returns the variant name.
    fn kind(&self) -> &'static str;

    /// Evaluates one attempt. Never fails: problems map to verdicts.
    async fn evaluate(&self, context: &JudgeContext) -> JudgeOutcome;
}

/// Errors building a judge from a task definition.
#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("Invalid judge script: {0}")]
    InvalidScript(#[from] ScriptError),
}

/// Creates the judge for a task's judge definition.
///
/// Scripts are parsed here, so a syntax error is reported before the agent
/// ever runs.
pub fn build_judge(spec: &JudgeSpec, config: &JudgeConfig) -> Result<Box<dyn Judge>, JudgeError> {
    match spec {
        JudgeSpec::Command(command) => Ok(Box::new(CommandJudge::new(
            command.clone(),
            config.command_timeout,
        ))),
        JudgeSpec::Script(source) => Ok(Box::new(ScriptJudge::compile(
            source,
            config.script_timeout,
            config.script_limits.clone(),
        )?)),
    }
}
