use crate::errors::ReplayError;
use crate::logging::append_run_log;
use crate::runtime::{ProcessOutput, ProcessRequest, ProcessRunner};
use crate::types::CommitIdentity;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Result of `git diff --cached --quiet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedState {
    Clean,
    Dirty,
}

pub struct GitClient<'a> {
    runner: &'a dyn ProcessRunner,
    cwd: PathBuf,
}

impl<'a> GitClient<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, cwd: impl AsRef<Path>) -> Self {
        Self {
            runner,
            cwd: cwd.as_ref().to_path_buf(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn branch_exists(&self, branch: &str) -> Result<bool, ReplayError> {
        let refname = format!("refs/heads/{branch}");
        let out = self.run(["rev-parse", "--verify", "--quiet", refname.as_str()], &[])?;
        Ok(out.exit_code == 0)
    }

    /// Short name of the checked-out branch, `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>, ReplayError> {
        let out = self.run(["symbolic-ref", "--short", "HEAD"], &[])?;
        if out.exit_code != 0 {
            return Ok(None);
        }
        let name = out.stdout.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    pub fn count_commits(&self, branch: &str) -> Result<u64, ReplayError> {
        let out = self.run(["rev-list", "--count", branch], &[])?;
        if out.exit_code != 0 {
            append_run_log(
                "error",
                "git.count.failed",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "branch": branch,
                    "exit_code": out.exit_code,
                    "stderr": out.stderr
                }),
            );
            return Err(ReplayError::Process(format!(
                "cannot count commits on {branch}: {}",
                out.stderr.trim()
            )));
        }
        let count = out.stdout.trim().parse::<u64>().map_err(|_| {
            ReplayError::Process(format!(
                "unexpected rev-list output for {branch}: {:?}",
                out.stdout
            ))
        })?;
        append_run_log(
            "debug",
            "git.count.fetched",
            json!({
                "cwd": self.cwd.display().to_string(),
                "branch": branch,
                "count": count
            }),
        );
        Ok(count)
    }

    /// Paths touched by `hash` relative to its first parent, or to the empty
    /// tree for a root commit.
    pub fn changed_files(&self, hash: &str) -> Result<Vec<String>, ReplayError> {
        let out = self.run(
            ["diff-tree", "--no-commit-id", "--name-only", "-r", "--root", hash],
            &[],
        )?;
        if out.exit_code != 0 {
            append_run_log(
                "warn",
                "git.diff_tree.failed",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "hash": hash,
                    "exit_code": out.exit_code,
                    "stderr": out.stderr
                }),
            );
            return Err(ReplayError::Process(format!(
                "diff-tree {hash} exited {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Overwrites the working-tree copy of `path` with its content at `hash`.
    /// Returns `false` when git could not produce the path.
    pub fn checkout_path(&self, hash: &str, path: &str) -> Result<bool, ReplayError> {
        let out = self.run(["checkout", hash, "--", path], &[])?;
        if out.exit_code != 0 {
            append_run_log(
                "debug",
                "git.checkout_path.missing",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "hash": hash,
                    "path": path,
                    "exit_code": out.exit_code,
                    "stderr": out.stderr
                }),
            );
            return Ok(false);
        }
        Ok(true)
    }

    pub fn stage_all(&self) -> Result<(), ReplayError> {
        let out = self.run(["add", "-A"], &[])?;
        if out.exit_code != 0 {
            append_run_log(
                "error",
                "git.stage.failed",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "exit_code": out.exit_code,
                    "stderr": out.stderr
                }),
            );
            return Err(ReplayError::Process(format!(
                "git add -A exited {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    pub fn staged_state(&self) -> Result<StagedState, ReplayError> {
        let out = self.run(["diff", "--cached", "--quiet"], &[])?;
        match out.exit_code {
            0 => Ok(StagedState::Clean),
            1 => Ok(StagedState::Dirty),
            code => Err(ReplayError::Process(format!(
                "git diff --cached exited {code}: {}",
                out.stderr.trim()
            ))),
        }
    }

    pub fn commit(
        &self,
        message: &str,
        identity: &CommitIdentity,
        allow_empty: bool,
    ) -> Result<(), ReplayError> {
        let mut args = vec!["commit"];
        if allow_empty {
            args.push("--allow-empty");
        }
        args.extend(["-m", message]);
        let out = self.run(args, &identity.env())?;
        if out.exit_code != 0 {
            append_run_log(
                "error",
                "git.commit.failed",
                json!({
                    "cwd": self.cwd.display().to_string(),
                    "allow_empty": allow_empty,
                    "exit_code": out.exit_code,
                    "stderr": out.stderr
                }),
            );
            return Err(ReplayError::Process(format!(
                "git commit exited {}: {}",
                out.exit_code,
                out.stderr.trim()
            )));
        }
        append_run_log(
            "info",
            "git.commit.created",
            json!({
                "cwd": self.cwd.display().to_string(),
                "allow_empty": allow_empty,
                "author": identity.name,
                "date": identity.date,
                "message": message
            }),
        );
        Ok(())
    }

    fn run<I, S>(&self, args: I, env: &[(String, String)]) -> Result<ProcessOutput, ReplayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.runner.run(ProcessRequest {
            program: "git".to_string(),
            args: args.into_iter().map(|s| s.as_ref().to_string()).collect(),
            cwd: Some(self.cwd.clone()),
            env: env.to_vec(),
        })
    }
}
