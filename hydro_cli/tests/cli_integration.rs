use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Small window and a stored pH calibration so live runs fire within a few ticks.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[filter]
window = 3
min_samples = 1

[[channels]]
name = "ph_up"
sensor = "ph"
condition = "below"
trigger_on = 5.5
trigger_off = 5.8
required_consecutive = 3
cooldown_ms = 30000
pulse_ms = 2000
relay_channel = 3

[[channels]]
name = "nutrient"
sensor = "tds"
condition = "below"
trigger_on = 675.0
trigger_off = 800.0
relay_channel = 1

[runner]
poll_ms = 1

# pH = -5 * V + 13
[calibration.ph]
slope = -5.0
offset = 13.0

[hardware]
relay_pins = [19, 18, 27]
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn hydro() -> Command {
    Command::cargo_bin("hydro").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK: channels [ph_up, nutrient]", "stdout")]
#[case(&["self-check"], 0, "calibrated probes: [ph]", "stdout")]
#[case(&["calibrate", "--sensor", "tds", "--point", "1:700:1.0"], 0, "slope = 700.0", "stdout")]
#[case(&["calibrate", "--sensor", "ph", "--point", "1:4.0:2.0", "--point", "2:7.0:2.0"], 3, "same voltage", "stderr")]
#[case(&["calibrate", "--sensor", "ph", "--point", "1:4.0:2.0"], 3, "Not enough calibration points", "stderr")]
#[case(&["calibrate", "--sensor", "tds", "--point", "4:700:1.0"], 3, "Point index 4", "stderr")]
#[case(&["calibrate", "--sensor", "ec", "--point", "1:700:1.0"], 2, "unknown sensor", "stderr")]
#[case(&["calibrate", "--sensor", "tds"], 1, "--points FILE", "stderr")]
#[case(&["convert", "--sensor", "ph", "--voltage", "1.5"], 0, "5.5000", "stdout")]
#[case(&["convert", "--sensor", "tds", "--voltage", "1.0"], 1, "no calibration stored for tds", "stderr")]
#[case(&["run", "--poll-ms", "fast"], 2, "invalid value", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = hydro();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }
    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn defaults_are_used_without_a_config_file() {
    hydro()
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("ph_up, ph_down, nutrient"));
}

#[rstest]
fn calibrate_json_reports_the_fit() {
    let out = hydro()
        .args(["--json", "calibrate", "--sensor", "ph"])
        .args(["--point", "1:4.0:2.0", "--point", "2:7.0:1.5"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["sensor"], "ph");
    assert!((v["slope"].as_f64().unwrap() + 6.0).abs() < 1e-9);
    assert!((v["offset"].as_f64().unwrap() - 16.0).abs() < 1e-9);
    assert_eq!(v["points_used"], 2);
}

#[rstest]
fn saved_calibration_feeds_convert() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("tds.csv");
    let mut f = fs::File::create(&csv).unwrap();
    writeln!(f, "point_index,reference_value,voltage").unwrap();
    writeln!(f, "1,1000.0,2.0").unwrap();
    let cal = dir.path().join("cal.toml");

    hydro()
        .args(["calibrate", "--sensor", "tds", "--points"])
        .arg(&csv)
        .arg("--save")
        .arg(&cal)
        .assert()
        .success();
    let saved = fs::read_to_string(&cal).unwrap();
    assert!(saved.contains("[tds]"), "{saved}");

    hydro()
        .args(["convert", "--sensor", "tds", "--voltage", "1.0", "--calibration"])
        .arg(&cal)
        .assert()
        .success()
        .stdout(predicate::str::contains("500.0000"));

    // A second probe merges into the same file.
    hydro()
        .args(["calibrate", "--sensor", "ph", "--point", "1:4.0:2.0", "--point", "2:7.0:1.5"])
        .arg("--save")
        .arg(&cal)
        .assert()
        .success();
    let saved = fs::read_to_string(&cal).unwrap();
    assert!(saved.contains("[tds]") && saved.contains("[ph]"), "{saved}");
}

#[rstest]
fn cli_reports_bad_calibration_header() {
    let dir = tempdir().unwrap();
    let bad_csv = dir.path().join("calib.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "raw,value").unwrap();
    writeln!(f, "1.0,700.0").unwrap();

    hydro()
        .args(["calibrate", "--sensor", "tds", "--points"])
        .arg(&bad_csv)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn missing_calibration_file_is_reported() {
    let dir = tempdir().unwrap();
    hydro()
        .args(["convert", "--sensor", "ph", "--voltage", "1.5", "--calibration"])
        .arg(dir.path().join("nope.toml"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does not exist"));
}

#[rstest]
#[case("[filter]\nwindow = 0\n")]
#[case("[[channels]]\nname = \"x\"\n")]
#[case("[runner]\nwater_temperature_c = 99.0\n")]
fn invalid_config_is_rejected(#[case] body: &str) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, body).unwrap();
    hydro()
        .arg("--config")
        .arg(&path)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[rstest]
fn json_errors_are_structured() {
    let out = hydro()
        .args(["--json", "calibrate", "--sensor", "ph"])
        .args(["--point", "1:4.0:2.0", "--point", "2:7.0:2.0"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    // The error object comes first; a structured log record may follow it.
    let stderr = String::from_utf8(out.stderr).unwrap();
    let first = stderr.lines().next().unwrap();
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert_eq!(v["reason"], "DegenerateRegression");
}

#[rstest]
fn live_run_doses_a_low_ph_reading() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    // 1.7 V -> pH 4.5, below the ph_up trigger; 2.0 V keeps TDS near 880 ppm.
    let out = hydro()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "run", "--max-ticks", "3", "--sim-voltage", "ph=1.7"])
        .args(["--sim-voltage", "tds=2.0"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["ticks"], 3);
    assert_eq!(v["observations"], 6);
    assert_eq!(v["activations"], 1);
    // The run ends mid-pulse and the relay is released on the way out.
    assert_eq!(v["deactivations"], 1);
    assert_eq!(v["relay_errors"], 0);
}

#[rstest]
fn live_run_with_override_never_doses() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    hydro()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--max-ticks", "4", "--sim-voltage", "ph=1.7", "--override"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 activations"));
}

#[rstest]
fn live_run_without_calibration_samples_tds_on_the_factory_curve() {
    // 1.0 V at 25 °C reads about 367 ppm, below the nutrient trigger.
    let out = hydro()
        .args(["--json", "run", "--max-ticks", "3", "--poll-ms", "1"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["ticks"], 3);
    assert_eq!(v["observations"], 3);
    assert_eq!(v["activations"], 1);
}
