//! Git metadata recorded with each report.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::runner::process::{run_shell, ShellCommand};

const UNKNOWN: &str = "unknown";
const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Repository state of the harness checkout at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub branch: String,
    pub hash: String,
    /// Tracked files with unstaged modifications; `None` when git is unavailable.
    pub local_changes: Option<usize>,
}

impl Default for GitInfo {
    fn default() -> Self {
        Self {
            branch: UNKNOWN.to_string(),
            hash: UNKNOWN.to_string(),
            local_changes: None,
        }
    }
}

impl GitInfo {
    /// Collects branch, short hash and local change count for `dir`.
    ///
    /// Never fails: fields that cannot be determined fall back to
    /// `"unknown"` / `None`.
    pub async fn collect(dir: &Path) -> Self {
        let branch = git_line(dir, "git rev-parse --abbrev-ref HEAD").await;
        let hash = git_line(dir, "git rev-parse --short HEAD").await;
        let local_changes = git_output(dir, "git diff --name-only")
            .await
            .map(|out| out.lines().filter(|l| !l.trim().is_empty()).count());

        let info = Self {
            branch: branch.unwrap_or_else(|| UNKNOWN.to_string()),
            hash: hash.unwrap_or_else(|| UNKNOWN.to_string()),
            local_changes,
        };
        debug!(branch = %info.branch, hash = %info.hash, local_changes = ?info.local_changes, "Collected git info");
        info
    }
}

async fn git_line(dir: &Path, command: &str) -> Option<String> {
    git_output(dir, command)
        .await
        .map(|out| out.trim().to_string())
        .filter(|line| !line.is_empty())
}

async fn git_output(dir: &Path, command: &str) -> Option<String> {
    let spec = ShellCommand::new(command, GIT_TIMEOUT).in_dir(dir);
    match run_shell(&spec).await {
        Ok(output) if output.is_success() => Some(output.stdout),
        Ok(output) => {
            debug!(command, exit_code = output.exit_code, "git command failed");
            None
        }
        Err(e) => {
            debug!(command, error = %e, "git command could not run");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_unknown() {
        let info = GitInfo::default();
        assert_eq!(info.branch, "unknown");
        assert_eq!(info.hash, "unknown");
        assert!(info.local_changes.is_none());
    }

    #[tokio::test]
    async fn test_collect_outside_repository() {
        // A fresh temp dir is not a git checkout unless TMPDIR is inside one.
        let dir = TempDir::new().unwrap();
        let info = GitInfo::collect(dir.path()).await;
        if info.hash == "unknown" {
            assert_eq!(info.branch, "unknown");
            assert!(info.local_changes.is_none());
        }
    }

    #[test]
    fn test_serializes_null_local_changes() {
        let json = serde_json::to_value(GitInfo::default()).unwrap();
        assert!(json["local_changes"].is_null());
    }
}
