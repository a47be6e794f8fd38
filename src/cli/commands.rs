//! CLI command definitions for agent-bench.
//!
//! `run` executes a task file against an agent and writes the benchmark
//! report; `check` validates a task file without running anything.
//! `humaneval` asks the agent to complete HumanEval problems and
//! `completions` exports the results for the HumanEval evaluator.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use super::session::BenchmarkSession;
use crate::config::{BenchmarkConfig, DEFAULT_AGENT, DEFAULT_CONFIG_PATH};
use crate::humaneval;
use crate::judge::build_judge;
use crate::report::{BenchmarkReport, GitInfo, ReportWriter};
use crate::runner::{cancel_pair, clean_datasets_dir, AgentInvoker, TaskRunner};
use crate::scheduler::{resolve_workers, Scheduler};
use crate::storage::SinkTarget;
use crate::task::{load_tasks, Task, TaskFilter};

/// Default task file.
const DEFAULT_PROBLEM_FILE: &str = "./config/honest_benchmark.jsonl";

/// Default directory for task archives and workspaces.
const DEFAULT_DATASETS_DIR: &str = "./datasets";

/// Default directory for benchmark reports.
const DEFAULT_OUTPUT_DIR: &str = "./benchmark_results";

/// Default directory HumanEval problems are seeded in.
const DEFAULT_HUMANEVAL_DIR: &str = "./humaneval";

/// Default HumanEval completion export file.
const DEFAULT_COMPLETION_FILE: &str = "completion.jsonl";

/// Benchmark harness for instruction-following agents.
#[derive(Parser)]
#[command(name = "agent-bench")]
#[command(about = "Run benchmark tasks against an agent, judge the results and report")]
#[command(version)]
#[command(
    long_about = "agent-bench runs each task of a JSONL file against an external agent, judges every attempt with a shell command or an inline judge script, retries failures and writes a JSON report.\n\nExample usage:\n  agent-bench run ./config/honest_benchmark.jsonl --parallel 4 --fail-fast"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the tasks of a task file and write the benchmark report.
    #[command(alias = "eval")]
    Run(RunArgs),

    /// Validate a task file: ids, judges and judge script syntax.
    Check(CheckArgs),

    /// Ask the agent to complete each HumanEval problem's script.py.
    Humaneval(HumanEvalArgs),

    /// Export completed HumanEval scripts to completion.jsonl.
    Completions(CompletionsArgs),
}

/// Arguments for `agent-bench run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the JSONL file containing the tasks.
    #[arg(default_value = DEFAULT_PROBLEM_FILE)]
    pub problem_file: PathBuf,

    /// Path to the benchmark configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub benchmark_config: PathBuf,

    /// Agent profile from the benchmark configuration.
    #[arg(long, default_value = DEFAULT_AGENT)]
    pub agent_config: String,

    /// Run only the task with this id.
    #[arg(long = "test")]
    pub test: Option<String>,

    /// Run tasks starting from this id, in file order.
    #[arg(long = "from")]
    pub from: Option<String>,

    /// Stop after the first task that fails all its attempts.
    #[arg(long)]
    pub fail_fast: bool,

    /// Number of parallel workers (0 = one per CPU).
    #[arg(short, long, default_value = "0")]
    pub parallel: usize,

    /// Description recorded in the report.
    #[arg(short, long)]
    pub description: Option<String>,

    /// Directory holding task archives and per-task workspaces.
    #[arg(long, default_value = DEFAULT_DATASETS_DIR)]
    pub datasets_dir: PathBuf,

    /// Directory the report is written to.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// PostgreSQL URL for result records.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Append result records to this JSONL file.
    #[arg(long)]
    pub results_jsonl: Option<PathBuf>,
}

/// Arguments for `agent-bench check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Path to the JSONL file containing the tasks.
    #[arg(default_value = DEFAULT_PROBLEM_FILE)]
    pub problem_file: PathBuf,

    /// Print the result as JSON.
    #[arg(short, long)]
    pub json: bool,
}

/// Arguments for `agent-bench humaneval`.
#[derive(Parser, Debug)]
pub struct HumanEvalArgs {
    /// Path to the HumanEval problem JSONL file.
    pub problem_file: PathBuf,

    /// Path to the benchmark configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub benchmark_config: PathBuf,

    /// Agent profile from the benchmark configuration.
    #[arg(long, default_value = DEFAULT_AGENT)]
    pub agent_config: String,

    /// Run only the problem with this task id.
    #[arg(long = "test")]
    pub test: Option<String>,

    /// Run problems starting from this task id, in file order.
    #[arg(long = "from")]
    pub from: Option<String>,

    /// Number of problems worked on at once.
    #[arg(short, long, default_value_t = humaneval::DEFAULT_WORKERS)]
    pub parallel: usize,

    /// Directory the problem scripts are seeded in.
    #[arg(short, long, default_value = DEFAULT_HUMANEVAL_DIR)]
    pub output_dir: PathBuf,
}

/// Arguments for `agent-bench completions`.
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Directory holding the numbered problem folders, e.g. ./humaneval/HumanEval.
    #[arg(long)]
    pub base_dir: PathBuf,

    /// Output file name.
    #[arg(long, default_value = DEFAULT_COMPLETION_FILE)]
    pub output_file: PathBuf,
}

/// Parse CLI arguments and return the Cli struct.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_benchmark_command(args).await,
        Commands::Check(args) => run_check_command(args),
        Commands::Humaneval(args) => run_humaneval_command(args).await,
        Commands::Completions(args) => run_completions_command(args),
    }
}

// ============================================================================
// Run Command Implementation
// ============================================================================

async fn run_benchmark_command(args: RunArgs) -> anyhow::Result<()> {
    info!(
        problem_file = %args.problem_file.display(),
        benchmark_config = %args.benchmark_config.display(),
        agent = %args.agent_config,
        parallel = args.parallel,
        fail_fast = args.fail_fast,
        "Starting benchmark run"
    );

    let config = BenchmarkConfig::load(&args.benchmark_config).apply_env()?;
    config.validate()?;
    let profile = config.agent_profile(&args.agent_config)?;

    let tasks = load_tasks(&args.problem_file)?;
    let tasks = TaskFilter {
        only: args.test.clone(),
        from: args.from.clone(),
    }
    .apply(tasks)?;
    if tasks.is_empty() {
        warn!(file = %args.problem_file.display(), "No tasks to run");
    }

    clean_datasets_dir(&args.datasets_dir).with_context(|| {
        format!(
            "Failed to prepare datasets directory {}",
            args.datasets_dir.display()
        )
    })?;

    let run_config = Arc::new(config.to_run_config(&args.datasets_dir, profile));
    let agent: Arc<dyn AgentInvoker> = Arc::new(profile.build_agent());
    let (cancel, signal) = cancel_pair();
    let scheduler = Scheduler::new(TaskRunner::new(run_config, agent)?).with_cancel(signal);

    let sink = SinkTarget::from_options(args.database_url.clone(), args.results_jsonl.clone())
        .open_or_noop()
        .await;

    let report = BenchmarkReport::new(&config.benchmark_name, config.retry_limit)
        .with_description(args.description.clone())
        .with_model_pairs(config.model_pairs.clone())
        .with_git(GitInfo::collect(Path::new(".")).await);

    let workers = resolve_workers(args.parallel).min(tasks.len().max(1));
    info!(workers, tasks = tasks.len(), agent = %args.agent_config, "Running tasks");

    let outcome = BenchmarkSession::new(report, ReportWriter::new(&args.output_dir))
        .with_sink(sink)
        .with_benchmark_file(args.problem_file.display().to_string())
        .with_fail_fast(args.fail_fast)
        .execute(&scheduler, cancel, tasks, workers, interrupted())
        .await?;

    println!(
        "{}/{} tasks passed ({:.1}%), report: {}",
        outcome.summary.completed,
        outcome.summary.total_results,
        outcome.summary.pass_rate(),
        outcome.report_path.display()
    );

    if let Some(task_id) = outcome.fail_fast_task {
        anyhow::bail!("Task {task_id} failed; stopped due to --fail-fast");
    }
    Ok(())
}

/// Resolves on the first Ctrl-C.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Check Command Implementation
// ============================================================================

/// Problem found in one task of a task file.
#[derive(Debug, Clone, serde::Serialize)]
struct TaskIssue {
    task_id: String,
    error: String,
}

/// Returns the problems that would make `task` fail before its first attempt.
fn check_task(task: &Task, config: &BenchmarkConfig) -> Option<TaskIssue> {
    let issue = |error: String| TaskIssue {
        task_id: task.id.clone(),
        error,
    };
    if let Err(e) = task.validate_id() {
        return Some(issue(e.to_string()));
    }
    let spec = match task.judge() {
        Ok(spec) => spec,
        Err(e) => return Some(issue(e.to_string())),
    };
    build_judge(&spec, &config.judge_config())
        .err()
        .map(|e| issue(e.to_string()))
}

fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let tasks = load_tasks(&args.problem_file)?;
    let config = BenchmarkConfig::default();
    let issues: Vec<TaskIssue> = tasks
        .iter()
        .filter_map(|task| check_task(task, &config))
        .collect();

    if args.json {
        let output = serde_json::json!({
            "file": args.problem_file.display().to_string(),
            "tasks": tasks.len(),
            "issues": issues,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}: {} tasks", args.problem_file.display(), tasks.len());
        for issue in &issues {
            println!("  {}: {}", issue.task_id, issue.error);
        }
    }

    if !issues.is_empty() {
        anyhow::bail!("{} of {} tasks are invalid", issues.len(), tasks.len());
    }
    Ok(())
}

// ============================================================================
// HumanEval Commands Implementation
// ============================================================================

async fn run_humaneval_command(args: HumanEvalArgs) -> anyhow::Result<()> {
    let config = BenchmarkConfig::load(&args.benchmark_config).apply_env()?;
    let profile = config.agent_profile(&args.agent_config)?;

    let problems = humaneval::load_problems(&args.problem_file)?;
    let problems = TaskFilter {
        only: args.test.clone(),
        from: args.from.clone(),
    }
    .select(problems, |p| p.task_id.as_str())?;
    info!(
        problems = problems.len(),
        workers = args.parallel,
        agent = %args.agent_config,
        output_dir = %args.output_dir.display(),
        "Running HumanEval problems"
    );

    let agent: Arc<dyn AgentInvoker> = Arc::new(profile.build_agent());
    let run = humaneval::run_problems(
        problems,
        &args.output_dir,
        agent,
        profile.timeout(),
        args.parallel,
    );
    let outcomes = tokio::select! {
        outcomes = run => outcomes,
        _ = interrupted() => anyhow::bail!("Interrupted; running agents were stopped"),
    };

    for outcome in &outcomes {
        match (&outcome.error, outcome.exit_code) {
            (Some(error), _) => println!("{}: error: {error}", outcome.task_id),
            (None, code) => println!("{}: exit {}", outcome.task_id, code.unwrap_or(-1)),
        }
    }
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    println!("{succeeded}/{} problems completed by the agent", outcomes.len());
    Ok(())
}

fn run_completions_command(args: CompletionsArgs) -> anyhow::Result<()> {
    let count = humaneval::export_completions(&args.base_dir, &args.output_file)?;
    println!("{count} completions written to {}", args.output_file.display());
    Ok(())
}
