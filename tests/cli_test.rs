//! End-to-end tests for the command-line binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn harvester() -> Command {
    #[allow(clippy::expect_used)]
    Command::cargo_bin("oai-harvester").expect("binary builds")
}

#[test]
fn test_help_lists_subcommands() {
    harvester()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("harvest"))
        .stdout(predicate::str::contains("schedule"));
}

#[test]
fn test_harvest_requires_base_url() {
    harvester().arg("harvest").assert().failure();
}

#[test]
fn test_harvest_rejects_non_http_url() {
    harvester()
        .args(["harvest", "ftp://repo.example.org/oai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid base URL"));
}

#[test]
fn test_harvest_rejects_bad_datestamp() {
    harvester()
        .args([
            "harvest",
            "http://repo.example.org/oai",
            "--from",
            "next tuesday",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid datestamp"));
}
