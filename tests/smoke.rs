//! Smoke tests -- verify the binary runs and the offline commands work.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;

fn pulsewatch() -> Command {
    let mut cmd = Command::cargo_bin("pulsewatch").unwrap();
    cmd.env_remove("PULSEWATCH_CONFIG").env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_cli_help() {
    pulsewatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("ensemble anomaly detection"));
}

#[test]
fn test_cli_version() {
    pulsewatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("pulsewatch"));
}

#[test]
fn test_serve_subcommand_exists() {
    pulsewatch().args(["serve", "--help"]).assert().success();
}

#[test]
fn test_replay_subcommand_exists() {
    pulsewatch()
        .args(["replay", "--help"])
        .assert()
        .success()
        .stdout(predicates::str::contains("--input"));
}

#[test]
fn test_config_prints_defaults_with_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulsewatch.toml");
    std::fs::write(&path, "[detector]\nwindow = 8\n").unwrap();

    pulsewatch()
        .arg("config")
        .arg("--config")
        .arg(&path)
        .args(["--baseline", "30", "--exceed", "inclusive"])
        .assert()
        .success()
        .stdout(predicates::str::contains("window = 8"))
        .stdout(predicates::str::contains("baseline = 30"))
        .stdout(predicates::str::contains("exceed = \"inclusive\""))
        .stdout(predicates::str::contains("bind = \"0.0.0.0:8000\""));
}

#[test]
fn test_config_rejects_unreachable_sustain() {
    pulsewatch()
        .args(["config", "--sustain", "11", "--sustain-window", "10"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("sustain"));
}

#[test]
fn test_replay_writes_results_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("metrics.csv");
    let output = dir.path().join("alerts.csv");

    let mut file = std::fs::File::create(&input).unwrap();
    writeln!(file, "ts,cpu,mem,net_in").unwrap();
    for i in 0..30 {
        let spike = if i == 25 { 90.0 } else { 0.0 };
        writeln!(
            file,
            "2024-01-01T00:00:{i:02}Z,{},{},{}",
            10.0 + (i % 5) as f64 + spike,
            40.0 + (i % 3) as f64,
            1000.0 + (i % 7) as f64 * 10.0
        )
        .unwrap();
    }
    drop(file);

    pulsewatch()
        .arg("replay")
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicates::str::contains("Replay Summary"))
        .stdout(predicates::str::contains("Rows:         30"));

    let written = std::fs::read_to_string(&output).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("ts,score_ecod,score_iforest,score_ens,threshold,exceed,alarm")
    );
    let rows: Vec<&str> = lines.collect();
    // window 5: first result arrives with the fifth row
    assert_eq!(rows.len(), 26);
    assert!(rows[0].starts_with("2024-01-01T00:00:04Z,"));
    assert!(rows.iter().all(|r| r.split(',').count() == 7));
}

#[test]
fn test_replay_missing_input_fails() {
    pulsewatch()
        .args(["replay", "--input", "/nonexistent/metrics.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
}
