//! Runs the binary against a throwaway repository. Skipped when `git` is
//! not on PATH.

use assert_cmd::cargo::cargo_bin_cmd;
use std::fs;
use std::path::Path;
use std::process::Command;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn git(repo: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(["-c", "user.name=Fixture", "-c", "user.email=fixture@example.com"])
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(repo)
        .output()
        .expect("spawn git");
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn commit_all(repo: &Path, message: &str) -> String {
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-q", "-m", message]);
    git(repo, &["rev-parse", "HEAD"])
}

struct Fixture {
    _root: tempfile::TempDir,
    repo: std::path::PathBuf,
    scratch: std::path::PathBuf,
    hashes: Vec<String>,
}

/// `main` has four commits; `rewritten-history` is checked out at the
/// second, so the resume point is 2.
fn fixture() -> Fixture {
    let root = tempfile::tempdir().expect("tempdir");
    let repo = root.path().join("repo");
    let scratch = root.path().join("scratch");
    fs::create_dir_all(&repo).expect("repo dir");
    fs::create_dir_all(&scratch).expect("scratch dir");
    git(&repo, &["init", "-q"]);

    let mut hashes = Vec::new();
    fs::write(repo.join("a.txt"), "one\n").expect("a");
    hashes.push(commit_all(&repo, "c0"));
    fs::write(repo.join("b.txt"), "b\n").expect("b");
    fs::write(repo.join("c.txt"), "c\n").expect("c");
    hashes.push(commit_all(&repo, "c1"));
    fs::write(repo.join("a.txt"), "two\n").expect("a2");
    hashes.push(commit_all(&repo, "c2"));
    fs::write(repo.join("d.txt"), "d\n").expect("d");
    fs::write(repo.join("e.txt"), "e\n").expect("e");
    hashes.push(commit_all(&repo, "c3"));

    git(&repo, &["checkout", "-q", "-b", "rewritten-history", &hashes[1]]);

    Fixture {
        _root: root,
        repo,
        scratch,
        hashes,
    }
}

fn run_replay(fx: &Fixture, plan: &str) -> String {
    let plan_path = fx.scratch.join("plan.txt");
    fs::write(&plan_path, plan).expect("plan");
    let mut cmd = cargo_bin_cmd!("commit-replay");
    cmd.current_dir(&fx.scratch)
        .arg("--repo")
        .arg(&fx.repo)
        .arg("--plan")
        .arg(&plan_path)
        .arg("--report")
        .arg(fx.scratch.join("report.json"))
        .env("TMPDIR", &fx.scratch);
    let out = cmd.assert().success();
    String::from_utf8(out.get_output().stdout.clone()).expect("utf8")
}

#[test]
fn replays_pending_records_onto_rebuilt_branch() {
    if !git_available() {
        return;
    }
    let fx = fixture();
    let h = &fx.hashes;
    let plan = format!(
        "0|{}|Fixture|fixture@example.com|2024-01-01 09:00:00|c0|0|1\n\
         1|{}|Fixture|fixture@example.com|2024-01-02 09:00:00|c1|0|1\n\
         2|{}|Asha Rao|asha@example.com|2024-01-03 09:00:00|Update a|0|1\n\
         3|{}|Ravi K|ravi@example.com|2024-01-04 09:00:00|Add d and e|0|2\n\
         4|{}|Ravi K|ravi@example.com|2024-01-04 09:00:00|Add d and e|1|2\n",
        h[0], h[1], h[2], h[3], h[3]
    );

    let stdout = run_replay(&fx, &plan);
    assert!(stdout.contains("Current commits: 2"));
    assert!(stdout.contains("Processing 3 remaining commits..."));
    assert!(stdout.contains("Complete! Total commits: 5"));

    let subjects = git(&fx.repo, &["log", "--format=%s", "-3"]);
    assert_eq!(
        subjects.lines().collect::<Vec<_>>(),
        vec!["Add d and e (part 2/2)", "Add d and e (part 1/2)", "Update a"]
    );
    assert_eq!(
        git(&fx.repo, &["log", "-1", "--format=%an <%ae> %ai", "HEAD"]),
        "Ravi K <ravi@example.com> 2024-01-04 09:00:00 +0530"
    );
    assert_eq!(
        git(&fx.repo, &["log", "-1", "--format=%cn %ci", "HEAD~2"]),
        "Asha Rao 2024-01-03 09:00:00 +0530"
    );
    assert_eq!(
        git(&fx.repo, &["show", "--name-only", "--format=", "HEAD~1"]),
        "d.txt"
    );
    assert_eq!(
        git(&fx.repo, &["show", "--name-only", "--format=", "HEAD"]),
        "e.txt"
    );
    assert_eq!(
        fs::read_to_string(fx.repo.join("a.txt")).expect("a"),
        "two\n"
    );
}

#[test]
fn record_with_no_net_change_still_adds_one_commit() {
    if !git_available() {
        return;
    }
    let fx = fixture();
    let plan = format!(
        "0|{0}|F|f@example.com|2024-01-01 09:00:00|c0|0|1\n\
         1|{1}|F|f@example.com|2024-01-02 09:00:00|c1|0|1\n\
         2|{1}|F|f@example.com|2024-01-02 09:30:00|Reapply c1|0|1\n",
        fx.hashes[0], fx.hashes[1]
    );

    run_replay(&fx, &plan);

    assert_eq!(
        git(&fx.repo, &["rev-list", "--count", "rewritten-history"]),
        "3"
    );
    assert_eq!(git(&fx.repo, &["log", "-1", "--format=%s"]), "Reapply c1");
    assert_eq!(
        git(&fx.repo, &["show", "--name-only", "--format=", "HEAD"]),
        ""
    );

    let report = fs::read_to_string(fx.scratch.join("report.json")).expect("report");
    let value: serde_json::Value = serde_json::from_str(&report).expect("json");
    assert_eq!(value["outcomes"][0]["kind"], "empty");
    assert_eq!(value["final_count"], 3);
}

#[test]
fn rerun_after_completion_replays_nothing() {
    if !git_available() {
        return;
    }
    let fx = fixture();
    let plan = format!(
        "0|{0}|F|f@example.com|2024-01-01 09:00:00|c0|0|1\n\
         1|{1}|F|f@example.com|2024-01-02 09:00:00|c1|0|1\n",
        fx.hashes[0], fx.hashes[1]
    );

    let stdout = run_replay(&fx, &plan);
    assert!(stdout.contains("Processing 0 remaining commits..."));
    assert_eq!(
        git(&fx.repo, &["rev-list", "--count", "rewritten-history"]),
        "2"
    );
}

#[test]
fn unreachable_original_commit_is_replayed_as_an_empty_commit() {
    if !git_available() {
        return;
    }
    let fx = fixture();
    let h = &fx.hashes;
    let plan = format!(
        "0|{}|F|f@example.com|2024-01-01 09:00:00|c0|0|1\n\
         1|{}|F|f@example.com|2024-01-02 09:00:00|c1|0|1\n\
         2|deadbeefdeadbeefdeadbeefdeadbeefdeadbeef|F|f@example.com|2024-01-03 09:00:00|Lost|0|1\n\
         3|{}|F|f@example.com|2024-01-04 09:00:00|Update a|0|1\n\
         4|{}|F|f@example.com|2024-01-05 09:00:00|Add d and e|0|1\n",
        h[0], h[1], h[2], h[3]
    );

    let stdout = run_replay(&fx, &plan);
    assert!(stdout.contains("Processing 3 remaining commits..."));
    assert!(stdout.contains("list_files failed, committed anyway"));
    assert_eq!(
        git(&fx.repo, &["rev-list", "--count", "rewritten-history"]),
        "5"
    );
    assert_eq!(
        git(&fx.repo, &["log", "--format=%s", "-3"])
            .lines()
            .collect::<Vec<_>>(),
        vec!["Add d and e", "Update a", "Lost"]
    );
    assert_eq!(
        git(&fx.repo, &["show", "--name-only", "--format=", "HEAD~2"]),
        ""
    );

    let report = fs::read_to_string(fx.scratch.join("report.json")).expect("report");
    let value: serde_json::Value = serde_json::from_str(&report).expect("json");
    assert_eq!(value["outcomes"][0]["outcome"], "committed");
    assert_eq!(value["outcomes"][0]["degraded"][0]["step"], "list_files");

    let rerun = run_replay(&fx, &plan);
    assert!(rerun.contains("Current commits: 5"));
    assert!(rerun.contains("Processing 0 remaining commits..."));
    assert_eq!(
        git(&fx.repo, &["rev-list", "--count", "rewritten-history"]),
        "5"
    );
}
