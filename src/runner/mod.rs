//! Task runner for benchmark evaluation.
//!
//! This module drives a single task from workspace preparation to its final
//! result:
//!
//! ```text
//! Task ─► Workspace ─► Agent process ─► Judge ─► Attempt ─► TaskResult
//!                          ▲                        │
//!                          └──────── retry ◄────────┘
//! ```
//!
//! The runner:
//! 1. Unpacks the task archive (or creates an empty directory)
//! 2. Invokes the agent in the workspace with the task instruction
//! 3. Judges the attempt and retries failures up to the retry limit
//! 4. Folds every outcome, including setup failures, into a [`TaskResult`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use agent_bench::runner::{RunConfig, ShellAgent, TaskRunner};
//! use agent_bench::task::Task;
//!
//! let config = Arc::new(RunConfig::new("./datasets").with_retry_limit(2));
//! let runner = TaskRunner::new(config, Arc::new(ShellAgent::new("@2501")))?;
//!
//! let task = Task::with_command("list", "list the files", "test -s list.txt");
//! let result = runner.run(&task).await.into_result();
//! ```

pub mod agents;
pub mod cancel;
pub mod config;
pub mod executor;
pub mod process;
pub mod result;
pub mod workspace;

pub use agents::{AgentError, AgentInvoker, AgentOutput, AgentRequest, ShellAgent};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use config::{RunConfig, TransientClassifier};
pub use executor::{RunOutcome, RunnerError, TaskRunner};
pub use result::{accuracy_for, Attempt, TaskResult};
pub use workspace::{clean_datasets_dir, Workspace, WorkspaceError};
