// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sqd` command-line specs

use assert_cmd::Command;

fn sqd() -> Command {
    let mut cmd = Command::cargo_bin("sqd").unwrap();
    for var in ["SQ_DATABASE_URL", "SQ_ENGINE_COMMAND", "SQ_MAX_BATCH_SIZE", "SQ_NO_INTERACTIVE"] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_the_worker_flags() {
    let output = sqd().arg("--help").assert().success().get_output().stdout.clone();
    let help = String::from_utf8(output).unwrap();
    for flag in ["--database-url", "--max-batch-size", "--no-interactive", "--config"] {
        assert!(help.contains(flag), "missing {flag} in:\n{help}");
    }
}

#[test]
fn missing_database_url_is_reported() {
    let output = sqd()
        .args(["--engine-command", "/bin/true"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("database_url is required"), "{stderr}");
}

#[test]
fn zero_batch_size_is_rejected_before_connecting() {
    let output = sqd()
        .args(["--database-url", "postgres://127.0.0.1:1/none", "--engine-command", "/bin/true"])
        .args(["-b", "0"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("batch size"), "{stderr}");
}
