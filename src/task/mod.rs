//! Benchmark task definitions.
//!
//! A task is one benchmark unit: an instruction for the agent plus exactly one
//! judge that decides whether an attempt passed. Tasks are read-only once a
//! run starts.

pub mod loader;

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::TaskError;

pub use loader::{load_tasks, parse_tasks, TaskFilter};

/// One benchmark task, as read from a task file line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier; also names the task's workspace directory.
    pub id: String,
    /// Instruction sent to the external agent.
    pub input: String,
    /// Free-form labels. Accepts a list or a comma-separated string.
    #[serde(default, alias = "labels", deserialize_with = "deserialize_tags")]
    pub tags: BTreeSet<String>,
    /// Shell command judging the attempt by its exit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
    /// Inline judge script that must set `output` to PASS or FAIL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_script: Option<String>,
    /// File holding the judge script. Replaces `test_script` when set; the
    /// loader reads it relative to the task file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    /// Judge script under its older field name, used when `test_script` is absent.
    #[serde(default, rename = "test", skip_serializing)]
    pub legacy_test: Option<String>,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Task {
    /// Creates a task judged by an inline script.
    pub fn with_script(
        id: impl Into<String>,
        input: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            tags: BTreeSet::new(),
            test_command: None,
            test_script: Some(script.into()),
            script_path: None,
            legacy_test: None,
            description: None,
        }
    }

    /// Creates a task judged by an external command.
    pub fn with_command(
        id: impl Into<String>,
        input: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
            tags: BTreeSet::new(),
            test_command: Some(command.into()),
            test_script: None,
            script_path: None,
            legacy_test: None,
            description: None,
        }
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resolves the judge variant for this task.
    ///
    /// Blank fields count as absent. When both fields are present the command
    /// takes precedence, matching how existing task files were authored. A
    /// task with `script_path` is judged only by the script read from it.
    pub fn judge(&self) -> Result<JudgeSpec, TaskError> {
        let non_blank = |s: &Option<String>| {
            s.as_ref()
                .filter(|v| !v.trim().is_empty())
                .map(|v| v.to_string())
        };

        if let Some(command) = non_blank(&self.test_command) {
            return Ok(JudgeSpec::Command(command));
        }
        if let Some(script) = non_blank(&self.test_script) {
            return Ok(JudgeSpec::Script(script));
        }
        if let Some(path) = &self.script_path {
            return Err(TaskError::UnreadableScript {
                task_id: self.id.clone(),
                path: path.display().to_string(),
            });
        }
        if let Some(script) = non_blank(&self.legacy_test) {
            return Ok(JudgeSpec::Script(script));
        }
        Err(TaskError::MissingJudge(self.id.clone()))
    }

    /// Checks that the task id can name a workspace directory.
    pub fn validate_id(&self) -> Result<(), TaskError> {
        let id = self.id.as_str();
        let usable = !id.trim().is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\', '\0']);
        if usable {
            Ok(())
        } else {
            Err(TaskError::InvalidId(self.id.clone()))
        }
    }
}

/// The resolved judge variant of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum JudgeSpec {
    /// External command; exit code 0 passes.
    Command(String),
    /// Inline judge script.
    Script(String),
}

impl JudgeSpec {
    /// Returns the command line or script source.
    pub fn source(&self) -> &str {
        match self {
            JudgeSpec::Command(s) | JudgeSpec::Script(s) => s,
        }
    }

    /// Returns the variant name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            JudgeSpec::Command(_) => "command",
            JudgeSpec::Script(_) => "script",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTags {
    List(Vec<String>),
    Joined(String),
}

/// Accepts `["a", "b"]`, `"a, b"` and the legacy `["a, b"]` form.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTags>::deserialize(deserializer)?;
    let items = match raw {
        None => Vec::new(),
        Some(RawTags::List(items)) => items,
        Some(RawTags::Joined(joined)) => vec![joined],
    };

    Ok(items
        .iter()
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect())
}
