//! Configuration for task runs.

use std::path::PathBuf;
use std::time::Duration;

use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::judge::JudgeConfig;

/// Default number of retries after the first attempt: three attempts in all.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

/// Default agent invocation timeout.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(600);

/// Upstream message treated as transient unless configured otherwise.
pub const DEFAULT_TRANSIENT_PATTERN: &str = "The server has returned an error";

/// Settings shared by every task runner in a benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Retries allowed after the first attempt.
    pub retry_limit: u32,
    /// Timeout for one agent invocation.
    pub agent_timeout: Duration,
    /// Directory holding task archives and per-task workspaces.
    pub datasets_dir: PathBuf,
    /// Text appended to every instruction as `"<input>. <suffix>"`.
    pub prompt_suffix: Option<String>,
    /// Judge timeouts and limits.
    pub judge: JudgeConfig,
    /// Regex patterns marking a judge error as transient.
    pub transient_patterns: Vec<String>,
}

impl RunConfig {
    /// Creates a run configuration with defaults.
    pub fn new(datasets_dir: impl Into<PathBuf>) -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
            datasets_dir: datasets_dir.into(),
            prompt_suffix: None,
            judge: JudgeConfig::default(),
            transient_patterns: vec![DEFAULT_TRANSIENT_PATTERN.to_string()],
        }
    }

    /// Sets the retry limit.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets the agent timeout.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Sets the prompt suffix.
    pub fn with_prompt_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.prompt_suffix = Some(suffix.into());
        self
    }

    /// Sets the judge configuration.
    pub fn with_judge(mut self, judge: JudgeConfig) -> Self {
        self.judge = judge;
        self
    }

    /// Replaces the transient error patterns.
    pub fn with_transient_patterns(mut self, patterns: Vec<String>) -> Self {
        self.transient_patterns = patterns;
        self
    }

    /// Builds the instruction sent to the agent for `input`.
    pub fn prompt_for(&self, input: &str) -> String {
        match self.prompt_suffix.as_deref().map(str::trim) {
            Some(suffix) if !suffix.is_empty() => format!("{input}. {suffix}"),
            _ => input.to_string(),
        }
    }

    /// Compiles the transient patterns.
    pub fn transient_classifier(&self) -> Result<TransientClassifier, ConfigError> {
        TransientClassifier::new(&self.transient_patterns)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new("datasets")
    }
}

/// Decides whether a judge error message is worth retrying.
#[derive(Debug, Clone)]
pub struct TransientClassifier {
    patterns: RegexSet,
}

impl TransientClassifier {
    /// Compiles `patterns`, reporting the first invalid one.
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        for pattern in patterns {
            if let Err(source) = regex::Regex::new(pattern) {
                return Err(ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                });
            }
        }
        let patterns = RegexSet::new(patterns).map_err(|source| ConfigError::InvalidPattern {
            pattern: patterns.join("|"),
            source,
        })?;
        Ok(Self { patterns })
    }

    /// Returns true if `message` matches any pattern.
    pub fn is_transient(&self, message: &str) -> bool {
        self.patterns.is_match(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.retry_limit, 2);
        assert_eq!(config.agent_timeout, Duration::from_secs(600));
        assert_eq!(config.datasets_dir, PathBuf::from("datasets"));
        assert_eq!(config.transient_patterns, vec![DEFAULT_TRANSIENT_PATTERN]);
    }

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("/tmp/ds")
            .with_retry_limit(1)
            .with_agent_timeout(Duration::from_secs(5))
            .with_prompt_suffix("be brief");

        assert_eq!(config.retry_limit, 1);
        assert_eq!(config.agent_timeout, Duration::from_secs(5));
        assert_eq!(config.prompt_suffix.as_deref(), Some("be brief"));
    }

    #[test]
    fn test_prompt_for() {
        let plain = RunConfig::default();
        assert_eq!(plain.prompt_for("list files"), "list files");

        let suffixed = RunConfig::default().with_prompt_suffix("no questions");
        assert_eq!(suffixed.prompt_for("list files"), "list files. no questions");

        let blank = RunConfig::default().with_prompt_suffix("   ");
        assert_eq!(blank.prompt_for("x"), "x");
    }

    #[test]
    fn test_transient_classifier() {
        let classifier = RunConfig::default().transient_classifier().unwrap();
        assert!(classifier.is_transient("Error: The server has returned an error (502)"));
        assert!(!classifier.is_transient("judge command could not run"));

        let none = TransientClassifier::new(&[]).unwrap();
        assert!(!none.is_transient("anything"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = TransientClassifier::new(&["(unclosed".to_string()]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "(unclosed"));
    }
}
