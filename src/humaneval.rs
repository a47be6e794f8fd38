//! HumanEval completion runs.
//!
//! Each HumanEval problem is seeded as `<base>/<task_id>/script.py` holding
//! the problem prompt. The agent is asked to complete the file in place; no
//! judge runs. [`export_completions`] later collects the finished scripts
//! into the `completion.jsonl` format consumed by the HumanEval evaluator.

use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::runner::{AgentInvoker, AgentRequest};

/// File each problem prompt is written to.
pub const SCRIPT_FILE: &str = "script.py";

/// Prefix of HumanEval task ids, e.g. `HumanEval/12`.
pub const TASK_ID_PREFIX: &str = "HumanEval/";

/// Default number of problems worked on at once.
pub const DEFAULT_WORKERS: usize = 3;

/// Instruction given to the agent for every problem.
pub const COMPLETION_PROMPT: &str = "\
complete the script.py file in the workspace following its instructions.

test the new script with doctest, example : python -m doctest -v script.py
- if the test fails, fix and retry until it passes the test,
- if the test pass, goes to the next one and so on...,
- if the test pass BUT there is no test apparently,
- fix the doctest in the script and retry until it passes with test, some doctest are not well formatted on purpose,
think about edgy cases if you need to add some tests.
- beware the types of returns (string, int, etc.)

don't remove the breaklines at the beginning and the end of the script, they are necessary for the tests to pass
don't write tests in the script, they should be only written in the doctest

IMPORTANT : no item shoud have no tests and all should pass.
doctest output examples :
1 items had no tests >> NOT GOOD
2 passed and 1 failed >> NOT GOOD
0 passed and 0 failed >> NOT GOOD
all tests passed >> GOOD
";

/// Errors from seeding problems or exporting completions.
#[derive(Debug, Error)]
pub enum HumanEvalError {
    #[error("Task id '{0}' is not usable as a directory path")]
    InvalidTaskId(String),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HumanEvalError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One line of a HumanEval problem file. Other keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Problem {
    pub task_id: String,
    pub prompt: String,
}

/// Outcome of one agent run on a problem.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemOutcome {
    pub task_id: String,
    /// Agent exit code, when the agent ran to completion.
    pub exit_code: Option<i32>,
    /// Seeding or invocation error.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ProblemOutcome {
    /// Returns true when the agent exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One line of `completion.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub task_id: String,
    pub completion: String,
}

/// Loads problems from a JSONL file, skipping malformed lines with a warning.
pub fn load_problems(path: &Path) -> Result<Vec<Problem>, HumanEvalError> {
    let file = std::fs::File::open(path).map_err(HumanEvalError::io(path))?;
    let mut problems = Vec::new();
    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(HumanEvalError::io(path))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Problem>(&line) {
            Ok(problem) => problems.push(problem),
            Err(e) => warn!(line = index + 1, error = %e, "Skipping malformed problem line"),
        }
    }
    debug!(count = problems.len(), "Parsed problem file");
    Ok(problems)
}

/// Directory of `task_id` under `base`. Task ids may contain `/` but must
/// stay inside `base`.
pub fn problem_dir(base: &Path, task_id: &str) -> Result<PathBuf, HumanEvalError> {
    let relative = Path::new(task_id);
    let nested = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if task_id.trim().is_empty() || !nested {
        return Err(HumanEvalError::InvalidTaskId(task_id.to_string()));
    }
    Ok(base.join(relative))
}

/// Writes the problem prompt to its `script.py`, replacing earlier attempts.
pub fn seed_problem(base: &Path, problem: &Problem) -> Result<PathBuf, HumanEvalError> {
    let dir = problem_dir(base, &problem.task_id)?;
    std::fs::create_dir_all(&dir).map_err(HumanEvalError::io(&dir))?;
    let script = dir.join(SCRIPT_FILE);
    std::fs::write(&script, &problem.prompt).map_err(HumanEvalError::io(&script))?;
    Ok(dir)
}

/// Runs the agent on every problem, at most `workers` at a time.
///
/// Outcomes arrive in completion order. A problem that cannot be seeded is
/// reported without invoking the agent.
pub async fn run_problems(
    problems: Vec<Problem>,
    base: &Path,
    agent: Arc<dyn AgentInvoker>,
    timeout: Duration,
    workers: usize,
) -> Vec<ProblemOutcome> {
    futures::stream::iter(problems)
        .map(|problem| {
            let agent = Arc::clone(&agent);
            async move { run_problem(&problem, base, agent.as_ref(), timeout).await }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await
}

async fn run_problem(
    problem: &Problem,
    base: &Path,
    agent: &dyn AgentInvoker,
    timeout: Duration,
) -> ProblemOutcome {
    let started = Instant::now();
    let outcome = |exit_code, error| ProblemOutcome {
        task_id: problem.task_id.clone(),
        exit_code,
        error,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    let working_dir = match seed_problem(base, problem) {
        Ok(dir) => dir,
        Err(e) => {
            warn!(task_id = %problem.task_id, error = %e, "Cannot seed problem");
            return outcome(None, Some(e.to_string()));
        }
    };

    let request = AgentRequest {
        task_id: problem.task_id.clone(),
        attempt: 0,
        prompt: COMPLETION_PROMPT.to_string(),
        working_dir,
        timeout,
    };
    if let Err(e) = agent.prepare_attempt(&request).await {
        warn!(task_id = %problem.task_id, error = %e, "Agent pre-attempt command failed");
    }

    info!(task_id = %problem.task_id, "Executing problem");
    match agent.invoke(&request).await {
        Ok(output) => {
            if !output.is_success() {
                warn!(
                    task_id = %problem.task_id,
                    exit_code = output.exit_code,
                    stderr = %output.stderr,
                    "Agent exited with an error"
                );
            }
            outcome(Some(output.exit_code), None)
        }
        Err(e) => {
            warn!(task_id = %problem.task_id, error = %e, "Agent invocation failed");
            outcome(None, Some(e.to_string()))
        }
    }
}

/// Collects `<base>/<N>/script.py` files into `completion.jsonl` lines with
/// task id `HumanEval/<N>`, in numeric order of `N`.
///
/// Only directories named by digits count; those without a script are
/// skipped. Returns the number of completions written.
pub fn export_completions(base: &Path, output: &Path) -> Result<usize, HumanEvalError> {
    let completions = collect_completions(base)?;
    let mut file = std::io::BufWriter::new(
        std::fs::File::create(output).map_err(HumanEvalError::io(output))?,
    );
    for completion in &completions {
        let line = serde_json::to_string(completion)
            .map_err(|e| HumanEvalError::io(output)(e.into()))?;
        writeln!(file, "{line}").map_err(HumanEvalError::io(output))?;
    }
    file.flush().map_err(HumanEvalError::io(output))?;
    info!(count = completions.len(), output = %output.display(), "Exported completions");
    Ok(completions.len())
}

/// Reads the completions under `base` without writing them.
pub fn collect_completions(base: &Path) -> Result<Vec<Completion>, HumanEvalError> {
    let mut numbered = Vec::new();
    for entry in std::fs::read_dir(base).map_err(HumanEvalError::io(base))? {
        let entry = entry.map_err(HumanEvalError::io(base))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) || !entry.path().is_dir() {
            continue;
        }
        let Ok(number) = name.parse::<u64>() else {
            continue;
        };
        numbered.push((number, name, entry.path()));
    }
    numbered.sort();

    let mut completions = Vec::new();
    for (_, name, dir) in numbered {
        let script = dir.join(SCRIPT_FILE);
        if !script.is_file() {
            debug!(dir = %dir.display(), "No script to export");
            continue;
        }
        let completion = std::fs::read_to_string(&script).map_err(HumanEvalError::io(&script))?;
        completions.push(Completion {
            task_id: format!("{TASK_ID_PREFIX}{name}"),
            completion,
        });
    }
    Ok(completions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{AgentError, AgentOutput};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Appends a line to the seeded script and records the prompt it saw.
    struct CompletingAgent {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AgentInvoker for CompletingAgent {
        fn name(&self) -> &str {
            "completing"
        }

        async fn invoke(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError> {
            self.seen.lock().unwrap().push(request.task_id.clone());
            assert_eq!(request.prompt, COMPLETION_PROMPT);
            let script = request.working_dir.join(SCRIPT_FILE);
            let mut body = std::fs::read_to_string(&script)?;
            body.push_str("    return 1\n");
            std::fs::write(&script, body)?;
            Ok(AgentOutput::new(0, String::new(), String::new(), Duration::ZERO))
        }
    }

    fn problem(task_id: &str, prompt: &str) -> Problem {
        Problem {
            task_id: task_id.to_string(),
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn test_load_problems_skips_malformed_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("HumanEval.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"task_id":"HumanEval/0","prompt":"def f():\n","entry_point":"f"}"#,
                "\n\nnot json\n",
                r#"{"task_id":"HumanEval/1"}"#,
                "\n",
            ),
        )
        .unwrap();

        let problems = load_problems(&path).unwrap();
        assert_eq!(problems, vec![problem("HumanEval/0", "def f():\n")]);
    }

    #[test]
    fn test_problem_dir_stays_under_base() {
        let base = Path::new("/work");
        assert_eq!(
            problem_dir(base, "HumanEval/3").unwrap(),
            PathBuf::from("/work/HumanEval/3")
        );
        assert!(problem_dir(base, "../escape").is_err());
        assert!(problem_dir(base, "/abs").is_err());
        assert!(problem_dir(base, " ").is_err());
    }

    #[tokio::test]
    async fn test_run_and_export_completions() {
        let dir = TempDir::new().unwrap();
        let agent = Arc::new(CompletingAgent {
            seen: Mutex::new(Vec::new()),
        });
        let problems = vec![
            problem("HumanEval/10", "def b():\n"),
            problem("HumanEval/2", "def a():\n"),
            problem("../bad", "x"),
        ];

        let outcomes =
            run_problems(problems, dir.path(), agent.clone(), Duration::from_secs(5), 2).await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 2);
        let bad = outcomes.iter().find(|o| o.task_id == "../bad").unwrap();
        assert!(bad.error.as_deref().unwrap().contains("not usable"));
        assert_eq!(agent.seen.lock().unwrap().len(), 2);

        std::fs::create_dir(dir.path().join("HumanEval/notes")).unwrap();
        std::fs::create_dir(dir.path().join("HumanEval/7")).unwrap();
        let output = dir.path().join("completion.jsonl");
        let count = export_completions(&dir.path().join("HumanEval"), &output).unwrap();
        assert_eq!(count, 2);

        let lines: Vec<Completion> = std::fs::read_to_string(&output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0].task_id, "HumanEval/2");
        assert_eq!(lines[0].completion, "def a():\n    return 1\n");
        assert_eq!(lines[1].task_id, "HumanEval/10");
    }

    #[test]
    fn test_seed_replaces_previous_script() {
        let dir = TempDir::new().unwrap();
        seed_problem(dir.path(), &problem("HumanEval/0", "old")).unwrap();
        let seeded = seed_problem(dir.path(), &problem("HumanEval/0", "new")).unwrap();
        assert_eq!(std::fs::read_to_string(seeded.join(SCRIPT_FILE)).unwrap(), "new");
    }

    #[test]
    fn test_export_missing_base_fails() {
        let dir = TempDir::new().unwrap();
        let err = export_completions(&dir.path().join("absent"), &dir.path().join("c.jsonl"))
            .unwrap_err();
        assert!(matches!(err, HumanEvalError::Io { .. }));
    }
}
