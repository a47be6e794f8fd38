//! JSONL task file loading and task selection.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use tracing::{debug, warn};

use super::Task;
use crate::error::LoadError;

/// Loads tasks from a JSONL file.
///
/// Blank lines are ignored. Lines that are not valid JSON or lack a required
/// key are skipped with a warning; only an unreadable file fails the load.
/// Judge scripts named by `script_path` are read relative to the file.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tasks =
        parse_tasks(std::io::BufReader::new(file)).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    resolve_script_paths(&mut tasks, path.parent().unwrap_or(Path::new(".")));
    Ok(tasks)
}

/// Replaces `test_script` with the contents of `script_path` for every task
/// that names one. Relative paths are joined to `base`.
///
/// An unreadable script leaves the task without a script, so it fails as a
/// setup error instead of running a stale inline judge.
pub fn resolve_script_paths(tasks: &mut [Task], base: &Path) {
    for task in tasks.iter_mut() {
        let Some(script_path) = &task.script_path else {
            continue;
        };
        let full = base.join(script_path);
        task.test_script = match std::fs::read_to_string(&full) {
            Ok(source) => Some(source),
            Err(e) => {
                warn!(task_id = %task.id, path = %full.display(), error = %e, "Cannot read judge script");
                None
            }
        };
    }
}

/// Parses tasks from any line-oriented reader.
pub fn parse_tasks(reader: impl BufRead) -> std::io::Result<Vec<Task>> {
    let mut tasks = Vec::new();
    let mut seen = HashSet::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let task: Task = match serde_json::from_str(&line) {
            Ok(task) => task,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed task line");
                continue;
            }
        };

        if !seen.insert(task.id.clone()) {
            warn!(line = line_no, task_id = %task.id, "Skipping duplicate task id");
            continue;
        }

        tasks.push(task);
    }

    debug!(count = tasks.len(), "Parsed task file");
    Ok(tasks)
}

/// Selects a subset of tasks for partial runs.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Run only the task with this id.
    pub only: Option<String>,
    /// Skip tasks until this id, then run it and everything after it.
    pub from: Option<String>,
}

impl TaskFilter {
    /// Applies the filter, preserving task order.
    ///
    /// A filter naming an id that does not exist is an error rather than an
    /// empty run.
    pub fn apply(&self, tasks: Vec<Task>) -> Result<Vec<Task>, LoadError> {
        self.select(tasks, |task| task.id.as_str())
    }

    /// Applies the filter to any id-bearing items.
    pub fn select<T>(&self, items: Vec<T>, id_of: impl Fn(&T) -> &str) -> Result<Vec<T>, LoadError> {
        for id in self.only.iter().chain(self.from.iter()) {
            if !items.iter().any(|item| id_of(item) == id) {
                return Err(LoadError::UnknownTaskId(id.clone()));
            }
        }

        let mut started = self.from.is_none();
        Ok(items
            .into_iter()
            .filter(|item| {
                let id = id_of(item);
                if self.only.as_deref().is_some_and(|only| only != id) {
                    return false;
                }
                if !started && self.from.as_deref() == Some(id) {
                    started = true;
                }
                started
            })
            .collect())
    }
}
