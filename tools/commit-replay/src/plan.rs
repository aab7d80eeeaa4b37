//! Parsing of the pipe-delimited rewrite plan.
//!
//! Each line is `index|original_hash|author|email|date_str|message|split_idx|split_total`.
//! Fields past the eighth are ignored. Lines that cannot describe a
//! replayable record are dropped and reported back to the caller, never
//! treated as fatal.

use crate::errors::ReplayError;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;
use crate::types::CommitRecord;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::Path;

pub const PLAN_FIELD_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscardedLine {
    pub line_number: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    pub records: Vec<CommitRecord>,
    pub discarded: Vec<DiscardedLine>,
    pub sha256: String,
}

impl Plan {
    /// Records at or beyond the resume point, in plan order.
    pub fn pending(&self, resume_point: u64) -> Vec<&CommitRecord> {
        pending_records(&self.records, resume_point)
    }
}

pub fn pending_records(records: &[CommitRecord], resume_point: u64) -> Vec<&CommitRecord> {
    records
        .iter()
        .filter(|record| record.index >= resume_point)
        .collect()
}

pub fn load_plan(fs: &dyn FileSystem, path: &Path) -> Result<Plan, ReplayError> {
    if !fs.exists(path) {
        return Err(ReplayError::Plan(format!(
            "plan file not found: {}",
            path.display()
        )));
    }
    let text = fs.read_to_string(path)?;
    let plan = parse_plan(&text);
    for discarded in &plan.discarded {
        append_run_log(
            "warn",
            "plan.line.discarded",
            json!({
                "path": path.display().to_string(),
                "line": discarded.line_number,
                "reason": discarded.reason
            }),
        );
    }
    append_run_log(
        "info",
        "plan.loaded",
        json!({
            "path": path.display().to_string(),
            "records": plan.records.len(),
            "discarded": plan.discarded.len(),
            "sha256": plan.sha256
        }),
    );
    Ok(plan)
}

pub fn parse_plan(text: &str) -> Plan {
    let mut plan = Plan {
        sha256: digest_hex(text),
        ..Plan::default()
    };
    for (offset, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_plan_line(line) {
            Ok(record) => plan.records.push(record),
            Err(reason) => plan.discarded.push(DiscardedLine {
                line_number: offset + 1,
                reason,
            }),
        }
    }
    plan
}

pub fn parse_plan_line(line: &str) -> Result<CommitRecord, String> {
    let fields = line.trim().split('|').collect::<Vec<_>>();
    if fields.len() < PLAN_FIELD_COUNT {
        return Err(format!(
            "expected {PLAN_FIELD_COUNT} fields, found {}",
            fields.len()
        ));
    }

    let index = parse_number::<u64>(fields[0], "index")?;
    let split_idx = parse_number::<usize>(fields[6], "split_idx")?;
    let split_total = parse_number::<usize>(fields[7], "split_total")?;
    if split_total == 0 {
        return Err("split_total must be at least 1".to_string());
    }
    if split_idx >= split_total {
        return Err(format!(
            "split_idx {split_idx} out of range for split_total {split_total}"
        ));
    }

    Ok(CommitRecord {
        index,
        original_hash: fields[1].to_string(),
        author: fields[2].to_string(),
        email: fields[3].to_string(),
        date_str: fields[4].to_string(),
        message: fields[5].to_string(),
        split_idx,
        split_total,
    })
}

fn parse_number<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, String> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| format!("{field} is not a non-negative integer: {raw:?}"))
}

fn digest_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
