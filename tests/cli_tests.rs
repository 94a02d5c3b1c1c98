use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_demo_prints_batch_and_scaling_summary() {
    let mut cmd = Command::new(cargo_bin!("payhub"));
    cmd.arg("--payments").arg("12").arg("--fail-every").arg("5");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("batch: 10/12 succeeded"))
        .stdout(predicate::str::contains("dead-lettered: pay-"))
        .stdout(predicate::str::contains("scaling:"))
        .stdout(predicate::str::contains("fleet: 3 workers"));
}

#[test]
fn test_demo_all_payments_succeed_without_failures() {
    let mut cmd = Command::new(cargo_bin!("payhub"));
    cmd.arg("--payments").arg("6").arg("--fail-every").arg("100");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("batch: 6/6 succeeded"))
        .stdout(predicate::str::contains("dead-lettered").not());
}

#[test]
fn test_demo_honors_config_overrides() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    write!(config, r#"{{"queue": {{"capacity": 5}}}}"#).unwrap();

    let mut cmd = Command::new(cargo_bin!("payhub"));
    cmd.arg("--payments")
        .arg("12")
        .arg("--fail-every")
        .arg("100")
        .arg("--config")
        .arg(config.path());

    // Only 5 items fit the queue; the rest are rejected at submission.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("batch: 5/5 succeeded"));
}
