pub mod config;
pub mod errors;
pub mod git;
pub mod logging;
pub mod plan;
pub mod replayer;
pub mod runtime;
pub mod split;
pub mod types;

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use config::{comparable_path, is_inside, load_config, CliOverrides};
use errors::ReplayError;
use git::GitClient;
use logging::{append_run_log, init_run_logger, JsonlLogger};
use plan::load_plan;
use replayer::{ReplayOptions, ReplaySummary, Replayer};
use runtime::ProductionRuntime;
use serde_json::json;
use std::path::{Path, PathBuf};
use types::FailurePolicy;

#[derive(Debug, Clone, Parser)]
#[command(name = "commit-replay")]
#[command(about = "Resume replaying split commits from a rewrite plan onto a rebuilt branch")]
pub struct Cli {
    /// TOML config file; every key is optional.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Repository whose branch is being rebuilt.
    #[arg(long)]
    pub repo: Option<PathBuf>,
    #[arg(long)]
    pub branch: Option<String>,
    /// Pipe-delimited plan file.
    #[arg(long)]
    pub plan: Option<PathBuf>,
    /// Fixed offset appended to every author and committer date.
    #[arg(long = "tz-offset", allow_hyphen_values = true)]
    pub tz_offset: Option<String>,
    /// Denominator used in progress lines.
    #[arg(long)]
    pub expected_total: Option<u64>,
    #[arg(long, value_enum)]
    pub on_failure: Option<CliFailurePolicy>,
    /// List the file subset of each pending record without touching the repository.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
    /// Write the per-record outcome summary as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliFailurePolicy {
    Continue,
    Abort,
}

impl From<CliFailurePolicy> for FailurePolicy {
    fn from(value: CliFailurePolicy) -> Self {
        match value {
            CliFailurePolicy::Continue => FailurePolicy::Continue,
            CliFailurePolicy::Abort => FailurePolicy::Abort,
        }
    }
}

pub fn run() -> Result<i32, ReplayError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| ReplayError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, ReplayError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(ReplayError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        repo: cli.repo.clone(),
        branch: cli.branch.clone(),
        plan: cli.plan.clone(),
        timezone_offset: cli.tz_offset.clone(),
        expected_total: cli.expected_total,
        on_failure: cli.on_failure.map(Into::into),
    };
    let (cfg, scope) = load_config(
        &overrides,
        cwd,
        runtime.file_system.as_ref(),
        runtime.process_runner.as_ref(),
    )?;

    let report_path = cli.report.as_ref().map(|path| {
        let absolute = if path.is_absolute() {
            path.clone()
        } else {
            cwd.join(path)
        };
        comparable_path(runtime.file_system.as_ref(), &absolute)
    });
    if let Some(path) = &report_path {
        if is_inside(path, &scope.working_dir) {
            return Err(ReplayError::Cli(format!(
                "--report {} is inside the repository and would be committed",
                path.display()
            )));
        }
    }

    init_run_logger(JsonlLogger {
        path: cfg.logging.path.clone(),
        max_payload_bytes: cfg.logging.max_payload_bytes,
    });
    append_run_log(
        "info",
        "run.configured",
        json!({
            "repo": scope.working_dir.display().to_string(),
            "detected_root": scope.repo_root.as_ref().map(|root| root.display().to_string()),
            "branch": cfg.repo.branch,
            "plan": cfg.plan.path.display().to_string(),
            "timezone_offset": cfg.commit.timezone_offset,
            "on_failure": cfg.policy.on_failure.as_str(),
            "dry_run": cli.dry_run
        }),
    );

    let plan = load_plan(runtime.file_system.as_ref(), &cfg.plan.path)?;
    let git = GitClient::new(runtime.process_runner.as_ref(), &scope.working_dir);
    let replayer = Replayer::new(
        git,
        runtime.terminal.as_ref(),
        ReplayOptions {
            branch: cfg.repo.branch.clone(),
            timezone_offset: cfg.commit.timezone_offset.clone(),
            expected_total: cfg.plan.expected_total,
            on_failure: cfg.policy.on_failure,
            dry_run: cli.dry_run,
        },
    );
    let summary = replayer.run(&plan)?;

    if let Some(path) = &report_path {
        write_report(runtime, path, &summary)?;
    }

    Ok(if summary.aborted { 1 } else { 0 })
}

fn write_report(
    runtime: &ProductionRuntime,
    path: &Path,
    summary: &ReplaySummary,
) -> Result<(), ReplayError> {
    if let Some(parent) = path.parent() {
        runtime.file_system.create_dir_all(parent)?;
    }
    let rendered =
        serde_json::to_string_pretty(summary).map_err(|e| ReplayError::Io(e.to_string()))?;
    runtime.file_system.write_string(path, &rendered)
}

pub fn render_help() -> Result<String, ReplayError> {
    let mut cmd = Cli::command();
    let mut buffer = Vec::new();
    cmd.write_long_help(&mut buffer)
        .map_err(|e| ReplayError::Io(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ReplayError::Io(e.to_string()))
}
