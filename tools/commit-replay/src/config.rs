use crate::errors::ReplayError;
use crate::logging::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::runtime::{FileSystem, ProcessRequest, ProcessRunner};
use crate::types::{FailurePolicy, RepoScope};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_BRANCH: &str = "rewritten-history";
pub const DEFAULT_PLAN_PATH: &str = "/tmp/rewrite_commits.txt";
pub const DEFAULT_TIMEZONE_OFFSET: &str = "+0530";

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub repo: Option<PathBuf>,
    pub branch: Option<String>,
    pub plan: Option<PathBuf>,
    pub timezone_offset: Option<String>,
    pub expected_total: Option<u64>,
    pub on_failure: Option<FailurePolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    pub repo: RepoConfig,
    pub plan: PlanConfig,
    pub commit: CommitConfig,
    pub policy: PolicyConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    pub path: Option<PathBuf>,
    pub branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanConfig {
    pub path: PathBuf,
    /// Denominator shown in `Commit i/N` progress lines. Defaults to the
    /// number of parsed plan records.
    pub expected_total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitConfig {
    pub timezone_offset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyConfig {
    pub on_failure: FailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            repo: RepoConfig {
                path: None,
                branch: DEFAULT_BRANCH.to_string(),
            },
            plan: PlanConfig {
                path: PathBuf::from(DEFAULT_PLAN_PATH),
                expected_total: None,
            },
            commit: CommitConfig {
                timezone_offset: DEFAULT_TIMEZONE_OFFSET.to_string(),
            },
            policy: PolicyConfig {
                on_failure: FailurePolicy::Continue,
            },
            logging: LoggingConfig {
                path: std::env::temp_dir()
                    .join("commit-replay")
                    .join("run.jsonl"),
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialReplayConfig {
    repo: Option<PartialRepoConfig>,
    plan: Option<PartialPlanConfig>,
    commit: Option<PartialCommitConfig>,
    policy: Option<PartialPolicyConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialRepoConfig {
    path: Option<PathBuf>,
    branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialPlanConfig {
    path: Option<PathBuf>,
    expected_total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialCommitConfig {
    timezone_offset: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialPolicyConfig {
    on_failure: Option<FailurePolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
    process_runner: &dyn ProcessRunner,
) -> Result<(ReplayConfig, RepoScope), ReplayError> {
    let mut cfg = ReplayConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialReplayConfig = toml::from_str(&file_contents)
            .map_err(|e| ReplayError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);

    let scope = resolve_scope(process_cwd, &cfg, overrides, process_runner, fs);
    cfg.plan.path = absolutize_path(process_cwd, &cfg.plan.path);
    cfg.logging.path = comparable_path(fs, &absolutize_path(process_cwd, &cfg.logging.path));
    validate_config(&cfg, &scope)?;
    Ok((cfg, scope))
}

fn merge_partial_config(cfg: &mut ReplayConfig, partial: PartialReplayConfig) {
    if let Some(repo) = partial.repo {
        if repo.path.is_some() {
            cfg.repo.path = repo.path;
        }
        if let Some(branch) = repo.branch {
            cfg.repo.branch = branch;
        }
    }

    if let Some(plan) = partial.plan {
        if let Some(path) = plan.path {
            cfg.plan.path = path;
        }
        if plan.expected_total.is_some() {
            cfg.plan.expected_total = plan.expected_total;
        }
    }

    if let Some(commit) = partial.commit {
        if let Some(offset) = commit.timezone_offset {
            cfg.commit.timezone_offset = offset;
        }
    }

    if let Some(policy) = partial.policy {
        if let Some(on_failure) = policy.on_failure {
            cfg.policy.on_failure = on_failure;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = path;
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut ReplayConfig, overrides: &CliOverrides) {
    if let Some(branch) = &overrides.branch {
        cfg.repo.branch = branch.clone();
    }
    if let Some(plan) = &overrides.plan {
        cfg.plan.path = plan.clone();
    }
    if let Some(offset) = &overrides.timezone_offset {
        cfg.commit.timezone_offset = offset.clone();
    }
    if overrides.expected_total.is_some() {
        cfg.plan.expected_total = overrides.expected_total;
    }
    if let Some(policy) = overrides.on_failure {
        cfg.policy.on_failure = policy;
    }
}

/// Picks the repository to rewrite: `--repo`, then `repo.path`, then the
/// toplevel of the process cwd, then the cwd itself. The result is resolved
/// through symlinks and `..` so containment checks compare real locations.
pub fn resolve_scope(
    process_cwd: &Path,
    cfg: &ReplayConfig,
    overrides: &CliOverrides,
    process_runner: &dyn ProcessRunner,
    fs: &dyn FileSystem,
) -> RepoScope {
    let repo_root = detect_repo_root(process_cwd, process_runner);

    let working_dir = if let Some(path) = &overrides.repo {
        absolutize_path(process_cwd, path)
    } else if let Some(path) = &cfg.repo.path {
        absolutize_path(process_cwd, path)
    } else if let Some(root) = &repo_root {
        root.clone()
    } else {
        process_cwd.to_path_buf()
    };

    RepoScope {
        repo_root,
        working_dir: comparable_path(fs, &working_dir),
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

/// Resolves the deepest existing ancestor of `path` through the file system
/// and re-attaches the rest, then folds away `.` and `..`. Works for files
/// that do not exist yet, such as a log about to be created.
pub fn comparable_path(fs: &dyn FileSystem, path: &Path) -> PathBuf {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        if let Ok(real) = fs.canonicalize(existing) {
            let joined = tail.iter().rev().fold(real, |acc, part| acc.join(part));
            return lexical_normalize(&joined);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return lexical_normalize(path),
        }
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn detect_repo_root(process_cwd: &Path, process_runner: &dyn ProcessRunner) -> Option<PathBuf> {
    let output = process_runner
        .run(ProcessRequest {
            program: "git".to_string(),
            args: vec!["rev-parse".to_string(), "--show-toplevel".to_string()],
            cwd: Some(process_cwd.to_path_buf()),
            env: Vec::new(),
        })
        .ok()?;

    if output.exit_code != 0 {
        return None;
    }

    let trimmed = output.stdout.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(PathBuf::from(trimmed))
}

/// Accepts `+HHMM` / `-HHMM` as git does for fixed offsets.
pub fn is_valid_timezone_offset(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || !matches!(bytes[0], b'+' | b'-') {
        return false;
    }
    if !bytes[1..].iter().all(u8::is_ascii_digit) {
        return false;
    }
    let hours = (bytes[1] - b'0') * 10 + (bytes[2] - b'0');
    let minutes = (bytes[3] - b'0') * 10 + (bytes[4] - b'0');
    hours <= 14 && minutes < 60
}

/// Both arguments must already be `comparable_path` results.
pub fn is_inside(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

fn validate_config(cfg: &ReplayConfig, scope: &RepoScope) -> Result<(), ReplayError> {
    if cfg.repo.branch.trim().is_empty() {
        return Err(ReplayError::InvalidConfig(
            "repo.branch must not be empty".to_string(),
        ));
    }

    if !is_valid_timezone_offset(&cfg.commit.timezone_offset) {
        return Err(ReplayError::InvalidConfig(format!(
            "commit.timezone_offset must look like +0530, got {:?}",
            cfg.commit.timezone_offset
        )));
    }

    if cfg.plan.expected_total == Some(0) {
        return Err(ReplayError::InvalidConfig(
            "plan.expected_total must be greater than zero".to_string(),
        ));
    }

    if is_inside(&cfg.logging.path, &scope.working_dir) {
        return Err(ReplayError::InvalidConfig(format!(
            "logging.path {} is inside the repository and would be committed",
            cfg.logging.path.display()
        )));
    }

    Ok(())
}
