use predicates::prelude::*;
use rstest::rstest;
use assert_cmd::Command;

fn obs(sensor: &str, value: f64, at_ms: u64) -> String {
    format!("{{\"sensor\":\"{sensor}\",\"value\":{value},\"at_ms\":{at_ms}}}\n")
}

fn replay(args: &[&str], input: String) -> std::process::Output {
    Command::cargo_bin("hydro")
        .unwrap()
        .args(args)
        .args(["run", "--stdin"])
        .write_stdin(input)
        .output()
        .unwrap()
}

#[rstest]
fn replay_emits_activate_then_scheduled_deactivate() {
    let input = [0, 1_000, 2_000]
        .into_iter()
        .map(|t| obs("ph", 5.0, t))
        .collect::<String>();
    let out = replay(&["--json"], input);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let lines: Vec<serde_json::Value> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 3, "{lines:?}");

    assert_eq!(lines[0]["channel"], "ph_up");
    assert_eq!(lines[0]["relay"], 3);
    assert_eq!(lines[0]["action"], "activate");
    assert_eq!(lines[0]["at_ms"], 2_000);

    // Default pulse is 2 s; the trailing deadline is drained after input ends.
    assert_eq!(lines[1]["action"], "deactivate");
    assert_eq!(lines[1]["at_ms"], 4_000);

    let summary = &lines[2];
    assert_eq!(summary["observations"], 3);
    assert_eq!(summary["activations"], 1);
    assert_eq!(summary["deactivations"], 1);
}

#[rstest]
fn replay_text_mode_and_rejections() {
    let mut input = String::new();
    input.push_str(&obs("tds", 700.0, 0));
    input.push('\n');
    input.push_str(&obs("tds", -1.0, 1_000));
    let out = replay(&[], input);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(
        stdout.contains("run complete: 2 observations (1 rejected), 0 activations"),
        "{stdout}"
    );
}

#[rstest]
fn replay_reports_the_bad_line() {
    let mut input = obs("ph", 6.0, 0);
    input.push_str("{\"sensor\":\"ph\"}\n");
    Command::cargo_bin("hydro")
        .unwrap()
        .args(["run", "--stdin"])
        .write_stdin(input)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid observation on line 2"));
}

#[rstest]
fn replay_under_override_only_buffers() {
    let input = [0, 1_000, 2_000, 3_000]
        .into_iter()
        .map(|t| obs("ph", 4.0, t))
        .collect::<String>();
    Command::cargo_bin("hydro")
        .unwrap()
        .args(["run", "--stdin", "--override"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("0 activations"))
        .stdout(predicate::str::contains(" ON ").not());
}
