//! Inline judge scripts.
//!
//! A judge script is a short program in a small Python-flavoured language.
//! It runs in a fresh interpreter per evaluation with these names pre-bound:
//! `task_id`, `input`, `stdout`, `stderr`, `exit_code`, `attempt` and `files`
//! (workspace-relative paths). It must assign `output = "PASS"` or
//! `output = "FAIL"`.
//!
//! ```text
//! lines = stdout.strip().splitlines()
//! if exit_code == 0 and len(lines) == 2 and file_exists('list.txt'):
//!     output = 'PASS'
//! else:
//!     output = 'FAIL'
//! ```
//!
//! Scripts have no loops, no imports and no host access beyond
//! `read_file`/`file_exists` inside the workspace. Evaluation is bounded by a
//! step budget, a nesting limit, a string size cap, a budget for all values
//! the script holds and a wall-clock timeout.

pub mod eval;
pub mod lexer;
pub mod parser;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Judge, JudgeContext, JudgeOutcome};
use crate::runner::workspace::list_files;
use eval::{Interpreter, Value};
use parser::{parse, Program};

/// Default evaluation step budget.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Default cap on any string a script produces or reads.
pub const DEFAULT_MAX_STRING_BYTES: usize = 1024 * 1024;

/// Default budget for everything a script holds at once: assigned names plus
/// intermediate values.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 16 * 1024 * 1024;

/// Errors from parsing or running a judge script.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("SyntaxError at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("RuntimeError at line {line}: {message}")]
    Runtime { line: usize, message: String },

    #[error("raised at line {line}: {message}")]
    Raised { line: usize, message: String },

    #[error("step budget of {0} exhausted")]
    StepLimit(u64),

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Resource limits for one script evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptLimits {
    /// Maximum statements plus expression nodes evaluated.
    pub max_steps: u64,
    /// Maximum size of a string value, in bytes.
    pub max_string_bytes: usize,
    /// Maximum approximate memory held by script values, in bytes.
    pub max_value_bytes: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_string_bytes: DEFAULT_MAX_STRING_BYTES,
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

/// Judge backed by an inline script.
#[derive(Debug, Clone)]
pub struct ScriptJudge {
    program: Arc<Program>,
    timeout: Duration,
    limits: ScriptLimits,
}

impl ScriptJudge {
    /// Parses `source`; syntax errors surface here rather than per attempt.
    pub fn compile(
        source: &str,
        timeout: Duration,
        limits: ScriptLimits,
    ) -> Result<Self, ScriptError> {
        Ok(Self {
            program: Arc::new(parse(source)?),
            timeout,
            limits,
        })
    }
}

#[async_trait]
impl Judge for ScriptJudge {
    fn kind(&self) -> &'static str {
        "script"
    }

    async fn evaluate(&self, context: &JudgeContext) -> JudgeOutcome {
        let program = Arc::clone(&self.program);
        let limits = self.limits.clone();
        let context_owned = context.clone();
        let deadline = Instant::now() + self.timeout;

        let handle = tokio::task::spawn_blocking(move || {
            run_script(&program, &context_owned, limits, deadline)
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => {
                warn!(task_id = %context.task_id, "Judge script timed out");
                JudgeOutcome::defect(format!(
                    "judge script timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
            Ok(Err(join_error)) => {
                JudgeOutcome::error(format!("judge script crashed: {join_error}"))
            }
            Ok(Ok(Err(ScriptError::DeadlineExceeded))) => JudgeOutcome::defect(format!(
                "judge script timed out after {}s",
                self.timeout.as_secs()
            )),
            Ok(Ok(Err(e))) => {
                debug!(task_id = %context.task_id, error = %e, "Judge script failed");
                JudgeOutcome::defect(format!("judge script failed: {e}"))
            }
            Ok(Ok(Ok(output))) => interpret_output(output),
        }
    }
}

/// Runs a compiled script against one attempt and returns its `output`.
pub fn run_script(
    program: &Program,
    context: &JudgeContext,
    limits: ScriptLimits,
    deadline: Instant,
) -> Result<Option<Value>, ScriptError> {
    let files = list_files(&context.workspace)
        .into_iter()
        .map(Value::Str)
        .collect();

    let mut interpreter =
        Interpreter::new(context.workspace.clone(), limits).with_deadline(deadline);
    interpreter.bind("task_id", Value::Str(context.task_id.clone()));
    interpreter.bind("input", Value::Str(context.input.clone()));
    interpreter.bind("stdout", Value::Str(context.stdout.clone()));
    interpreter.bind("stderr", Value::Str(context.stderr.clone()));
    interpreter.bind("exit_code", Value::Int(i64::from(context.exit_code)));
    interpreter.bind("attempt", Value::Int(i64::from(context.attempt)));
    interpreter.bind("files", Value::List(files));

    interpreter.run(program)?;
    debug!(
        task_id = %context.task_id,
        steps = interpreter.steps(),
        "Judge script finished"
    );
    Ok(interpreter.get("output").cloned())
}

fn interpret_output(output: Option<Value>) -> JudgeOutcome {
    match output {
        None => JudgeOutcome::defect("judge script did not set output"),
        Some(Value::Str(s)) => match s.trim().to_uppercase().as_str() {
            "PASS" => JudgeOutcome::pass(),
            "FAIL" => JudgeOutcome::fail(),
            _ => JudgeOutcome::defect(format!(
                "judge script set output to {}, expected PASS or FAIL",
                Value::Str(s.clone()).repr()
            )),
        },
        Some(other) => JudgeOutcome::defect(format!(
            "judge script set output to {}, expected PASS or FAIL",
            other.repr()
        )),
    }
}
