//! Benchmark configuration.
//!
//! The configuration is read from a JSON file (default
//! `./config/benchmark_config.json`). A missing or unreadable file is not
//! fatal: the harness logs a warning and continues with defaults. Environment
//! variables then override individual values and the result is validated.
//!
//! ```json
//! {
//!   "benchmark_name": "AI Model Pair Benchmark",
//!   "retry_limit": 3,
//!   "model_pairs": [{"planner": "gpt-4o", "coder": "claude"}],
//!   "agents": {
//!     "CODING_AGENT": {
//!       "command": "@2501",
//!       "flush_command": "@2501 agents --flush",
//!       "timeout_secs": 600
//!     }
//!   }
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `BENCH_RETRY_LIMIT`: retries after the first attempt
//! - `BENCH_AGENT_TIMEOUT_SECS`: timeout of every agent profile
//! - `BENCH_COMMAND_JUDGE_TIMEOUT_SECS`: judge command timeout
//! - `BENCH_SCRIPT_JUDGE_TIMEOUT_SECS`: judge script timeout

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::judge::JudgeConfig;
use crate::runner::config::{DEFAULT_RETRY_LIMIT, DEFAULT_TRANSIENT_PATTERN};
use crate::runner::{RunConfig, ShellAgent, TransientClassifier};

/// Default path of the benchmark configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./config/benchmark_config.json";

/// Agent profile used when none is requested.
pub const DEFAULT_AGENT: &str = "CODING_AGENT";

const DEFAULT_BENCHMARK_NAME: &str = "AI Model Pair Benchmark";

const DEFAULT_PROMPT_SUFFIX: &str = "IMPORTANT: You are being benchmarked, don't output prose or comments. Only provide the shortest answer possible.";

/// How to launch one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    /// Command template; the quoted prompt replaces `{prompt}` or is appended.
    pub command: String,
    /// Command run in the workspace before every attempt.
    pub flush_command: Option<String>,
    /// Text appended to every instruction.
    pub prompt_suffix: Option<String>,
    pub timeout_secs: u64,
    /// Extra environment for the agent process.
    pub env: BTreeMap<String, String>,
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            command: "@2501".to_string(),
            flush_command: Some("@2501 agents --flush".to_string()),
            prompt_suffix: Some(DEFAULT_PROMPT_SUFFIX.to_string()),
            timeout_secs: 600,
            env: BTreeMap::new(),
        }
    }
}

impl AgentProfile {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds the shell agent for this profile.
    pub fn build_agent(&self) -> ShellAgent {
        let mut agent = ShellAgent::new(&self.command);
        if let Some(flush) = self.flush_command.as_deref().filter(|c| !c.trim().is_empty()) {
            agent = agent.with_flush_command(flush);
        }
        for (key, value) in &self.env {
            agent = agent.with_env(key, value);
        }
        agent
    }
}

/// Top-level benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub benchmark_name: String,
    pub retry_limit: u32,
    /// Model pair descriptions recorded verbatim in reports.
    pub model_pairs: Vec<serde_json::Value>,
    pub agents: BTreeMap<String, AgentProfile>,
    pub command_judge_timeout_secs: u64,
    pub script_judge_timeout_secs: u64,
    /// Regex patterns marking judge launch errors as transient.
    pub transient_errors: Vec<String>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        let judge = JudgeConfig::default();
        Self {
            benchmark_name: DEFAULT_BENCHMARK_NAME.to_string(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            model_pairs: Vec::new(),
            agents: BTreeMap::from([(DEFAULT_AGENT.to_string(), AgentProfile::default())]),
            command_judge_timeout_secs: judge.command_timeout.as_secs(),
            script_judge_timeout_secs: judge.script_timeout.as_secs(),
            transient_errors: vec![DEFAULT_TRANSIENT_PATTERN.to_string()],
        }
    }
}

impl BenchmarkConfig {
    /// Parses a configuration document.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads the configuration file, falling back to defaults with a warning.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read benchmark config, using defaults");
                return Self::default();
            }
        };
        match Self::parse(&content) {
            Ok(config) => {
                debug!(path = %path.display(), "Loaded benchmark config");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Invalid benchmark config, using defaults");
                Self::default()
            }
        }
    }

    /// Applies `BENCH_*` environment overrides.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(val) = lookup("BENCH_RETRY_LIMIT") {
            self.retry_limit = parse_env_value(&val, "BENCH_RETRY_LIMIT")?;
        }

        if let Some(val) = lookup("BENCH_AGENT_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "BENCH_AGENT_TIMEOUT_SECS")?;
            for profile in self.agents.values_mut() {
                profile.timeout_secs = secs;
            }
        }

        if let Some(val) = lookup("BENCH_COMMAND_JUDGE_TIMEOUT_SECS") {
            self.command_judge_timeout_secs =
                parse_env_value(&val, "BENCH_COMMAND_JUDGE_TIMEOUT_SECS")?;
        }

        if let Some(val) = lookup("BENCH_SCRIPT_JUDGE_TIMEOUT_SECS") {
            self.script_judge_timeout_secs =
                parse_env_value(&val, "BENCH_SCRIPT_JUDGE_TIMEOUT_SECS")?;
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` for unusable values and
    /// `ConfigError::InvalidPattern` for a transient pattern that is not a regex.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one agent profile is required".to_string(),
            ));
        }

        for (name, profile) in &self.agents {
            if profile.command.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "agent '{name}' has an empty command"
                )));
            }
            if profile.timeout_secs == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "agent '{name}' timeout_secs must be greater than 0"
                )));
            }
        }

        if self.command_judge_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "command_judge_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.script_judge_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "script_judge_timeout_secs must be greater than 0".to_string(),
            ));
        }

        TransientClassifier::new(&self.transient_errors)?;
        Ok(())
    }

    /// Looks up an agent profile by name.
    pub fn agent_profile(&self, name: &str) -> Result<&AgentProfile, ConfigError> {
        self.agents
            .get(name)
            .ok_or_else(|| ConfigError::UnknownAgent(name.to_string()))
    }

    /// Judge settings derived from this configuration.
    pub fn judge_config(&self) -> JudgeConfig {
        JudgeConfig {
            command_timeout: Duration::from_secs(self.command_judge_timeout_secs),
            script_timeout: Duration::from_secs(self.script_judge_timeout_secs),
            ..JudgeConfig::default()
        }
    }

    /// Builds the run configuration for `profile`.
    pub fn to_run_config(&self, datasets_dir: impl Into<PathBuf>, profile: &AgentProfile) -> RunConfig {
        let mut config = RunConfig::new(datasets_dir)
            .with_retry_limit(self.retry_limit)
            .with_agent_timeout(profile.timeout())
            .with_judge(self.judge_config())
            .with_transient_patterns(self.transient_errors.clone());
        if let Some(suffix) = profile.prompt_suffix.as_deref().filter(|s| !s.trim().is_empty()) {
            config = config.with_prompt_suffix(suffix);
        }
        config
    }
}

fn parse_env_value<T: FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.retry_limit, 2);
        let profile = config.agent_profile(DEFAULT_AGENT).unwrap();
        assert_eq!(profile.command, "@2501");
        assert_eq!(profile.timeout_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_document() {
        let config = BenchmarkConfig::parse(
            r#"{"retry_limit": 1, "model_pairs": [{"planner": "a"}], "extra": true}"#,
        )
        .unwrap();
        assert_eq!(config.retry_limit, 1);
        assert_eq!(config.model_pairs.len(), 1);
        assert!(config.agents.contains_key(DEFAULT_AGENT));
        assert_eq!(config.benchmark_name, "AI Model Pair Benchmark");
    }

    #[test]
    fn test_load_missing_or_invalid_falls_back() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            BenchmarkConfig::load(&dir.path().join("missing.json")),
            BenchmarkConfig::default()
        );

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert_eq!(BenchmarkConfig::load(&bad), BenchmarkConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = BenchmarkConfig::default()
            .apply_overrides(lookup(&[
                ("BENCH_RETRY_LIMIT", "5"),
                ("BENCH_AGENT_TIMEOUT_SECS", "30"),
                ("BENCH_SCRIPT_JUDGE_TIMEOUT_SECS", " 7 "),
            ]))
            .unwrap();
        assert_eq!(config.retry_limit, 5);
        assert_eq!(config.agents[DEFAULT_AGENT].timeout_secs, 30);
        assert_eq!(config.judge_config().script_timeout, Duration::from_secs(7));
    }

    #[test]
    fn test_invalid_env_value() {
        let err = BenchmarkConfig::default()
            .apply_overrides(lookup(&[("BENCH_RETRY_LIMIT", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "BENCH_RETRY_LIMIT"));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = BenchmarkConfig::default();
        config.command_judge_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationFailed(_))));

        let mut config = BenchmarkConfig::default();
        config.transient_errors = vec!["(unclosed".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern { .. })));

        let mut config = BenchmarkConfig::default();
        config.agents.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_agent() {
        let config = BenchmarkConfig::default();
        assert!(matches!(
            config.agent_profile("NOPE"),
            Err(ConfigError::UnknownAgent(name)) if name == "NOPE"
        ));
    }

    #[test]
    fn test_to_run_config() {
        let config = BenchmarkConfig::parse(r#"{"retry_limit": 2}"#).unwrap();
        let profile = config.agent_profile(DEFAULT_AGENT).unwrap();
        let run = config.to_run_config("/tmp/datasets", profile);
        assert_eq!(run.retry_limit, 2);
        assert_eq!(run.agent_timeout, Duration::from_secs(600));
        assert!(run.prompt_for("list files").starts_with("list files. IMPORTANT"));
        assert_eq!(run.datasets_dir, PathBuf::from("/tmp/datasets"));
    }
}
