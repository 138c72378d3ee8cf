//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("digitlink");
    cmd.env_remove("DIGITLINK_PORT")
        .env_remove("DIGITLINK_BAUD")
        .env_remove("DIGITLINK_MODE")
        .env("NO_COLOR", "1");
    cmd
}

/// Config file with no settings, so the user's own config is never read.
fn empty_config(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("empty.toml");
    fs::write(&path, "").expect("write empty config");
    path
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("digitlink"))
        .stdout(predicate::str::contains("Usage"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("digitlink"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("mnist"))
        .stdout(predicate::str::contains("self-test"));
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_digitlink()"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_invalid_mode() {
    let mut cmd = cli_cmd();
    cmd.args(["--mode", "turbo", "zeros"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("strict"));
}

#[test]
fn exit_code_two_without_port() {
    let dir = tempdir().expect("tempdir should be created");
    let config = empty_config(dir.path());

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("zeros")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("No serial port"));
}

#[test]
fn exit_code_two_for_zero_retries() {
    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "--retries", "0", "zeros"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("retries"));
}

#[test]
fn exit_code_one_for_missing_payload_file() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir
        .path()
        .join("missing.bin");

    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "send", "--json"])
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn exit_code_one_for_oversized_payload() {
    let dir = tempdir().expect("tempdir should be created");
    let big = dir
        .path()
        .join("big.bin");
    fs::write(&big, vec![0u8; 70_000]).expect("write payload");

    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "send"])
        .arg(&big)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("too large"));
}

#[test]
fn exit_code_one_for_unopenable_port() {
    let dir = tempdir().expect("tempdir should be created");
    let payload = dir
        .path()
        .join("img.bin");
    fs::write(&payload, [0u8; 784]).expect("write payload");

    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "send"])
        .arg(&payload)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("INVALID_PORT_NAME_XYZ"));
}

#[test]
fn pixel_index_out_of_range_fails() {
    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "pixel", "784"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn mnist_rejects_bad_magic() {
    let dir = tempdir().expect("tempdir should be created");
    let images = dir
        .path()
        .join("images.idx");
    let labels = dir
        .path()
        .join("labels.idx");
    fs::write(&images, [0u8; 16]).expect("write images");
    fs::write(&labels, [0u8; 8]).expect("write labels");

    let mut cmd = cli_cmd();
    cmd.args(["-p", "INVALID_PORT_NAME_XYZ", "mnist", "--images"])
        .arg(&images)
        .arg("--labels")
        .arg(&labels)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("magic"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn invalid_config_warns_and_falls_back() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("digitlink.toml");
    fs::write(&config, "invalid toml [[[").expect("write invalid config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("zeros")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Failed to parse config file"))
        .stderr(predicate::str::contains("No serial port"));
}

#[test]
fn config_file_supplies_port() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("digitlink.toml");
    fs::write(&config, "[connection]\nport = \"CONFIG_PORT_XYZ\"\n").expect("write config");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("ping")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("CONFIG_PORT_XYZ"));
}

#[test]
fn port_from_environment() {
    let dir = tempdir().expect("tempdir should be created");
    let config = empty_config(dir.path());

    let mut cmd = cli_cmd();
    cmd.env("DIGITLINK_PORT", "ENV_PORT_XYZ")
        .arg("--config")
        .arg(&config)
        .arg("info")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ENV_PORT_XYZ"));
}
