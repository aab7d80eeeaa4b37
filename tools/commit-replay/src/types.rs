use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One line of the rewrite plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub index: u64,
    pub original_hash: String,
    pub author: String,
    pub email: String,
    pub date_str: String,
    pub message: String,
    pub split_idx: usize,
    pub split_total: usize,
}

impl CommitRecord {
    /// Message written to the new commit. Split records carry a 1-based
    /// `(part K/N)` suffix.
    pub fn commit_message(&self) -> String {
        if self.split_total > 1 {
            format!(
                "{} (part {}/{})",
                self.message,
                self.split_idx + 1,
                self.split_total
            )
        } else {
            self.message.clone()
        }
    }

    pub fn identity(&self, timezone_offset: &str) -> CommitIdentity {
        CommitIdentity {
            name: self.author.clone(),
            email: self.email.clone(),
            date: format!("{} {timezone_offset}", self.date_str),
        }
    }
}

/// Author and committer identity injected into `git commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub date: String,
}

impl CommitIdentity {
    pub fn env(&self) -> Vec<(String, String)> {
        [
            ("GIT_AUTHOR_NAME", &self.name),
            ("GIT_AUTHOR_EMAIL", &self.email),
            ("GIT_AUTHOR_DATE", &self.date),
            ("GIT_COMMITTER_NAME", &self.name),
            ("GIT_COMMITTER_EMAIL", &self.email),
            ("GIT_COMMITTER_DATE", &self.date),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Continue,
    Abort,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStep {
    ListFiles,
    Stage,
    CheckStaged,
    Commit,
}

impl ReplayStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListFiles => "list_files",
            Self::Stage => "stage",
            Self::CheckStaged => "check_staged",
            Self::Commit => "commit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    WithChanges,
    Empty,
    /// Staged state could not be read; committed with `--allow-empty`.
    Unverified,
}

/// A step that failed without costing the record its commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedStep {
    pub step: ReplayStep,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Skipped {
        reason: String,
    },
    Committed {
        kind: CommitKind,
        files_selected: usize,
        files_applied: usize,
        files_missing: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        degraded: Vec<DegradedStep>,
    },
    Failed {
        step: ReplayStep,
        detail: String,
    },
}

impl RecordOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Committed { degraded, .. } if !degraded.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReport {
    pub index: u64,
    pub original_hash: String,
    pub message: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoScope {
    pub repo_root: Option<PathBuf>,
    pub working_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::{CommitKind, CommitRecord, DegradedStep, RecordOutcome, ReplayStep};

    fn record(split_idx: usize, split_total: usize) -> CommitRecord {
        CommitRecord {
            index: 4,
            original_hash: "abc123".to_string(),
            author: "Asha Rao".to_string(),
            email: "asha@example.com".to_string(),
            date_str: "2024-03-01 09:15:00".to_string(),
            message: "Add alumni directory".to_string(),
            split_idx,
            split_total,
        }
    }

    #[test]
    fn single_part_message_is_unchanged() {
        assert_eq!(record(0, 1).commit_message(), "Add alumni directory");
    }

    #[test]
    fn split_message_carries_one_based_part_suffix() {
        let message = record(1, 3).commit_message();
        assert!(message.ends_with("(part 2/3)"));
        assert_eq!(message, "Add alumni directory (part 2/3)");
    }

    #[test]
    fn identity_sets_author_and_committer_with_offset() {
        let env = record(0, 1).identity("+0530").env();
        assert_eq!(env.len(), 6);
        assert!(env.contains(&(
            "GIT_COMMITTER_DATE".to_string(),
            "2024-03-01 09:15:00 +0530".to_string()
        )));
        assert!(env.contains(&("GIT_AUTHOR_EMAIL".to_string(), "asha@example.com".to_string())));
    }

    #[test]
    fn failed_outcome_serializes_with_tag() {
        let outcome = RecordOutcome::Failed {
            step: ReplayStep::Commit,
            detail: "exit 128".to_string(),
        };
        let value = serde_json::to_value(&outcome).expect("json");
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["step"], "commit");
        assert!(outcome.is_failed());
    }

    #[test]
    fn degraded_commit_lists_the_steps_it_survived() {
        let clean = RecordOutcome::Committed {
            kind: CommitKind::Empty,
            files_selected: 0,
            files_applied: 0,
            files_missing: 0,
            degraded: Vec::new(),
        };
        let value = serde_json::to_value(&clean).expect("json");
        assert!(value.get("degraded").is_none());
        assert!(!clean.is_degraded());

        let degraded = RecordOutcome::Committed {
            kind: CommitKind::Unverified,
            files_selected: 0,
            files_applied: 0,
            files_missing: 0,
            degraded: vec![DegradedStep {
                step: ReplayStep::CheckStaged,
                detail: "exit 129".to_string(),
            }],
        };
        let value = serde_json::to_value(&degraded).expect("json");
        assert_eq!(value["kind"], "unverified");
        assert_eq!(value["degraded"][0]["step"], "check_staged");
        assert!(degraded.is_degraded());
        assert!(!degraded.is_failed());
    }
}
