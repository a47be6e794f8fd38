//! Child process execution with captured output and a hard timeout.
//!
//! Every external command the harness issues (agent invocations, agent flush
//! commands, judge commands) goes through [`run_shell`]. Children are spawned
//! with `kill_on_drop`, so a timeout or a dropped future terminates the
//! process instead of leaking it. Output beyond the capture limit is read
//! and discarded, never buffered.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Maximum number of bytes kept from a captured stream.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Bytes read from a stream before the rest is discarded. Leaves room for
/// whitespace trimmed before truncation.
const READ_LIMIT: u64 = 2 * MAX_CAPTURE_BYTES as u64;

/// A shell command to run.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Command line passed to `sh -c`.
    pub command: String,
    /// Working directory; inherits the harness's directory when unset.
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Text written to the child's stdin.
    pub stdin: Option<String>,
    /// Hard limit on wall-clock time.
    pub timeout: Duration,
}

impl ShellCommand {
    /// Creates a command with the given timeout and no extra settings.
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            env: Vec::new(),
            stdin: None,
            timeout,
        }
    }

    /// Sets the working directory.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Pipes text into the child's stdin.
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; -1 when the process was terminated by a signal.
    pub exit_code: i32,
    /// Captured stdout, trimmed and truncated.
    pub stdout: String,
    /// Captured stderr, trimmed and truncated.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Returns true if the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors from running a child process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs a command through `sh -c` and captures its output.
pub async fn run_shell(spec: &ShellCommand) -> Result<ProcessOutput, ProcessError> {
    let start = Instant::now();

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&spec.command);
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }
    cmd.env("TERM", "xterm");
    cmd.env("PYTHONIOENCODING", "utf-8");
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    cmd.stdin(if spec.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    debug!(command = %spec.command, "Spawning process");
    let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
        command: spec.command.clone(),
        source,
    })?;

    // Feed stdin concurrently so a chatty child cannot deadlock on a full pipe.
    if let (Some(input), Some(mut stdin)) = (spec.stdin.clone(), child.stdin.take()) {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "Child closed stdin early");
            }
            stdin.shutdown().await.ok();
        });
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let finished = async {
        tokio::try_join!(read_bounded(stdout), read_bounded(stderr), child.wait())
    };

    match tokio::time::timeout(spec.timeout, finished).await {
        Ok(Ok((stdout, stderr, status))) => Ok(ProcessOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: capture(&stdout),
            stderr: capture(&stderr),
            duration: start.elapsed(),
        }),
        Ok(Err(e)) => Err(ProcessError::Io(e)),
        Err(_) => {
            // The child is dropped with the future and killed by kill_on_drop.
            warn!(command = %spec.command, timeout = ?spec.timeout, "Process timed out");
            Err(ProcessError::Timeout(spec.timeout))
        }
    }
}

/// Reads up to [`READ_LIMIT`] bytes of a pipe, then drains it to EOF.
async fn read_bounded<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    (&mut pipe).take(READ_LIMIT).read_to_end(&mut kept).await?;
    let dropped = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    if dropped > 0 {
        debug!(dropped, "Discarded output beyond capture limit");
    }
    Ok(kept)
}

fn capture(bytes: &[u8]) -> String {
    truncate(String::from_utf8_lossy(bytes).trim(), MAX_CAPTURE_BYTES)
}

/// Truncates a string at a char boundary, marking the cut.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_shell_captures_output() {
        let out = run_shell(&ShellCommand::new(
            "echo hello; echo oops >&2",
            Duration::from_secs(10),
        ))
        .await
        .unwrap();
        assert!(out.is_success());
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.stderr, "oops");
    }

    #[tokio::test]
    async fn test_run_shell_exit_code() {
        let out = run_shell(&ShellCommand::new("exit 3", Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.is_success());
    }

    #[tokio::test]
    async fn test_run_shell_stdin_env_and_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let spec = ShellCommand::new("cat; echo \"$GREETING\"; pwd", Duration::from_secs(10))
            .with_stdin("from stdin\n")
            .with_env("GREETING", "hi")
            .in_dir(dir.path());
        let out = run_shell(&spec).await.unwrap();
        let lines: Vec<&str> = out.stdout.lines().collect();
        assert_eq!(lines[0], "from stdin");
        assert_eq!(lines[1], "hi");
        assert!(lines[2].ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
    }

    #[tokio::test]
    async fn test_run_shell_timeout() {
        let start = Instant::now();
        let err = run_shell(&ShellCommand::new("sleep 5", Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_shell_bounds_large_output() {
        let out = run_shell(&ShellCommand::new(
            "yes | head -c 20000000; yes err | head -c 5000000 >&2; exit 4",
            Duration::from_secs(60),
        ))
        .await
        .unwrap();
        assert_eq!(out.exit_code, 4);
        assert!(out.stdout.len() <= MAX_CAPTURE_BYTES + "... [truncated]".len());
        assert!(out.stdout.ends_with("... [truncated]"));
        assert!(out.stdout.starts_with("y\ny\n"));
        assert!(out.stderr.ends_with("... [truncated]"));
    }

    #[test]
    fn test_read_bounded_keeps_prefix() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let data = vec![b'a'; READ_LIMIT as usize * 3];
        let kept = rt.block_on(read_bounded(Some(&data[..]))).unwrap();
        assert_eq!(kept.len(), READ_LIMIT as usize);
        assert!(rt.block_on(read_bounded(None::<&[u8]>)).unwrap().is_empty());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert!(truncate("hello world", 5).ends_with("... [truncated]"));
        assert!(truncate("héllo wörld", 2).starts_with('h'));
    }
}
