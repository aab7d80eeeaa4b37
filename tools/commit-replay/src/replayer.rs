//! Resumable split-commit replay.
//!
//! The target branch's commit count is the resume point: plan records with
//! a lower index are assumed to be on the branch already. Every remaining
//! record yields exactly one commit, empty when its file subset changed
//! nothing, so the branch length keeps tracking the plan.

use crate::errors::ReplayError;
use crate::git::{GitClient, StagedState};
use crate::logging::append_run_log;
use crate::plan::Plan;
use crate::runtime::Terminal;
use crate::split::select_chunk;
use crate::types::{
    CommitKind, CommitRecord, DegradedStep, FailurePolicy, RecordOutcome, RecordReport,
    ReplayStep,
};
use serde::Serialize;
use serde_json::json;

const MESSAGE_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    pub branch: String,
    pub timezone_offset: String,
    pub expected_total: Option<u64>,
    pub on_failure: FailurePolicy,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub branch: String,
    pub resume_point: u64,
    pub plan_records: usize,
    pub discarded_lines: usize,
    pub plan_sha256: String,
    pub pending: usize,
    pub outcomes: Vec<RecordReport>,
    pub final_count: u64,
    pub aborted: bool,
}

impl ReplaySummary {
    pub fn committed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|report| matches!(report.outcome, RecordOutcome::Committed { .. }))
            .count()
    }

    pub fn degraded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|report| report.outcome.is_degraded())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|report| report.outcome.is_failed())
            .count()
    }
}

pub struct Replayer<'a> {
    git: GitClient<'a>,
    terminal: &'a dyn Terminal,
    options: ReplayOptions,
}

impl<'a> Replayer<'a> {
    pub fn new(git: GitClient<'a>, terminal: &'a dyn Terminal, options: ReplayOptions) -> Self {
        Self {
            git,
            terminal,
            options,
        }
    }

    /// The branch must exist and, unless nothing will be written, be the
    /// one checked out: commits land on HEAD while the resume point is
    /// counted on the branch.
    pub fn preflight(&self) -> Result<(), ReplayError> {
        let branch = &self.options.branch;
        if !self.git.branch_exists(branch)? {
            return Err(ReplayError::Preflight(format!(
                "branch {branch} not found in {}",
                self.git.cwd().display()
            )));
        }
        if self.options.dry_run {
            return Ok(());
        }
        match self.git.current_branch()? {
            Some(current) if current == *branch => Ok(()),
            Some(current) => Err(ReplayError::Preflight(format!(
                "HEAD is on {current}, expected {branch}"
            ))),
            None => Err(ReplayError::Preflight(format!(
                "HEAD is detached, expected {branch}"
            ))),
        }
    }

    pub fn run(&self, plan: &Plan) -> Result<ReplaySummary, ReplayError> {
        self.preflight()?;

        let branch = self.options.branch.as_str();
        let resume_point = self.git.count_commits(branch)?;
        self.terminal
            .write_line(&format!("Current commits: {resume_point}"))?;

        let pending = plan.pending(resume_point);
        self.terminal.write_line(&format!(
            "Processing {} remaining commits...",
            pending.len()
        ))?;
        append_run_log(
            "info",
            "replay.started",
            json!({
                "cwd": self.git.cwd().display().to_string(),
                "branch": branch,
                "resume_point": resume_point,
                "pending": pending.len(),
                "policy": self.options.on_failure.as_str(),
                "dry_run": self.options.dry_run
            }),
        );

        let total = self
            .options
            .expected_total
            .unwrap_or(plan.records.len() as u64);
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut aborted = false;
        for (position, record) in pending.iter().enumerate() {
            let ordinal = resume_point + position as u64 + 1;
            self.terminal.write_line(&format!(
                "Commit {ordinal}/{total}: {}...",
                preview(&record.message)
            ))?;

            let outcome = self.replay_record(record);
            match &outcome {
                RecordOutcome::Failed { step, detail } => {
                    self.terminal
                        .write_line(&format!("  failed at {}: {detail}", step.as_str()))?;
                }
                RecordOutcome::Committed { degraded, .. } => {
                    for step in degraded {
                        self.terminal.write_line(&format!(
                            "  {} failed, committed anyway: {}",
                            step.step.as_str(),
                            step.detail
                        ))?;
                    }
                }
                RecordOutcome::Skipped { .. } => {}
            }
            let failed = outcome.is_failed();
            outcomes.push(RecordReport {
                index: record.index,
                original_hash: record.original_hash.clone(),
                message: record.commit_message(),
                outcome,
            });

            if failed && self.options.on_failure == FailurePolicy::Abort {
                aborted = true;
                append_run_log(
                    "error",
                    "replay.aborted",
                    json!({
                        "branch": branch,
                        "index": record.index,
                        "remaining": pending.len() - position - 1
                    }),
                );
                break;
            }
        }

        let final_count = self.git.count_commits(branch)?;
        self.terminal
            .write_line(&format!("\nComplete! Total commits: {final_count}"))?;

        let summary = ReplaySummary {
            branch: branch.to_string(),
            resume_point,
            plan_records: plan.records.len(),
            discarded_lines: plan.discarded.len(),
            plan_sha256: plan.sha256.clone(),
            pending: pending.len(),
            outcomes,
            final_count,
            aborted,
        };
        append_run_log(
            "info",
            "replay.finished",
            json!({
                "branch": branch,
                "final_count": final_count,
                "committed": summary.committed(),
                "degraded": summary.degraded(),
                "failed": summary.failed(),
                "aborted": aborted
            }),
        );
        Ok(summary)
    }

    /// Applies one record and reports what happened. Never returns early on
    /// a git failure; the caller decides whether to keep going.
    pub fn replay_record(&self, record: &CommitRecord) -> RecordOutcome {
        let outcome = match self.try_replay_record(record) {
            Ok(outcome) => outcome,
            Err((step, error)) => RecordOutcome::Failed {
                step,
                detail: error.to_string(),
            },
        };
        let level = if outcome.is_failed() || outcome.is_degraded() {
            "warn"
        } else {
            "info"
        };
        append_run_log(
            level,
            "replay.record.finished",
            json!({
                "index": record.index,
                "hash": record.original_hash,
                "split": format!("{}/{}", record.split_idx + 1, record.split_total),
                "outcome": outcome
            }),
        );
        outcome
    }

    fn try_replay_record(
        &self,
        record: &CommitRecord,
    ) -> Result<RecordOutcome, (ReplayStep, ReplayError)> {
        let mut degraded = Vec::new();

        let files = match self.git.changed_files(&record.original_hash) {
            Ok(files) => files,
            Err(error) => {
                self.tolerate(record, ReplayStep::ListFiles, error, &mut degraded)?;
                Vec::new()
            }
        };
        let selected = select_chunk(&files, record.split_idx, record.split_total);

        if self.options.dry_run {
            let reason = match degraded.first() {
                Some(step) => format!("dry run: file list unavailable: {}", step.detail),
                None => format!(
                    "dry run: {} of {} files selected",
                    selected.len(),
                    files.len()
                ),
            };
            return Ok(RecordOutcome::Skipped { reason });
        }

        let mut applied = 0usize;
        for path in selected {
            // A path that cannot be checked out is skipped, not fatal.
            if matches!(self.git.checkout_path(&record.original_hash, path), Ok(true)) {
                applied += 1;
            }
        }

        if let Err(error) = self.git.stage_all() {
            self.tolerate(record, ReplayStep::Stage, error, &mut degraded)?;
        }
        let kind = match self.git.staged_state() {
            Ok(StagedState::Dirty) => CommitKind::WithChanges,
            Ok(StagedState::Clean) => CommitKind::Empty,
            Err(error) => {
                self.tolerate(record, ReplayStep::CheckStaged, error, &mut degraded)?;
                CommitKind::Unverified
            }
        };

        // A degraded record still occupies exactly one commit.
        let allow_empty = kind == CommitKind::Empty || !degraded.is_empty();
        let identity = record.identity(&self.options.timezone_offset);
        self.git
            .commit(&record.commit_message(), &identity, allow_empty)
            .map_err(|e| (ReplayStep::Commit, e))?;

        Ok(RecordOutcome::Committed {
            kind,
            files_selected: selected.len(),
            files_applied: applied,
            files_missing: selected.len() - applied,
            degraded,
        })
    }

    /// Under `abort` a failed step ends the record; under `continue` it is
    /// noted and the record carries on to its commit.
    fn tolerate(
        &self,
        record: &CommitRecord,
        step: ReplayStep,
        error: ReplayError,
        degraded: &mut Vec<DegradedStep>,
    ) -> Result<(), (ReplayStep, ReplayError)> {
        if self.options.on_failure == FailurePolicy::Abort {
            return Err((step, error));
        }
        append_run_log(
            "warn",
            "replay.step.degraded",
            json!({
                "index": record.index,
                "hash": record.original_hash,
                "step": step.as_str(),
                "detail": error.to_string()
            }),
        );
        degraded.push(DegradedStep {
            step,
            detail: error.to_string(),
        });
        Ok(())
    }
}

fn preview(message: &str) -> String {
    message.chars().take(MESSAGE_PREVIEW_CHARS).collect()
}
