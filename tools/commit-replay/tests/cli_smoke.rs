use assert_cmd::cargo::cargo_bin_cmd;

#[test]
fn help_lists_replay_flags() {
    let mut cmd = cargo_bin_cmd!("commit-replay");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    assert!(stdout.contains("--plan"));
    assert!(stdout.contains("--tz-offset"));
    assert!(stdout.contains("--on-failure"));
    assert!(stdout.contains("--dry-run"));
}

#[test]
fn render_help_matches_binary_flags() {
    let help = commit_replay::render_help().expect("help");
    assert!(help.contains("--report"));
    assert!(help.contains("--expected-total"));
}

#[test]
fn missing_plan_exits_nonzero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("commit-replay");
    cmd.current_dir(temp.path())
        .arg("--repo")
        .arg(temp.path())
        .arg("--plan")
        .arg(temp.path().join("absent.txt"));
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("plan file not found"));
}

#[test]
fn invalid_timezone_offset_exits_nonzero() {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("commit-replay");
    cmd.current_dir(temp.path())
        .arg("--repo")
        .arg(temp.path())
        .arg("--tz-offset")
        .arg("IST");
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("timezone_offset"));
}

#[test]
fn unknown_failure_policy_is_a_cli_error() {
    let mut cmd = cargo_bin_cmd!("commit-replay");
    cmd.arg("--on-failure").arg("retry");
    cmd.assert().failure();
}
