//! CLI integration tests
//!
//! Tests the cf-expose CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cf_expose() -> Command {
    Command::cargo_bin("cf-expose")
        .expect("Failed to locate cf-expose binary - ensure it's built before running tests")
}

/// Command isolated from the caller's credentials and `.env`
fn isolated(dir: &TempDir) -> Command {
    let mut cmd = cf_expose();
    cmd.current_dir(dir.path())
        .env_remove("CLOUDFLARE_API_TOKEN")
        .env_remove("CLOUDFLARE_ACCOUNT_ID")
        .env_remove("CLOUDFLARE_ZONE_ID");
    cmd
}

#[test]
fn test_cli_help() {
    cf_expose()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("cf-expose"))
        .stdout(predicate::str::contains("Cloudflare tunnel"));
}

#[test]
fn test_cli_version() {
    cf_expose()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cf-expose"));
}

#[test]
fn test_cli_up_help() {
    cf_expose()
        .args(["up", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--random"))
        .stdout(predicate::str::contains("--skip-readiness"));
}

#[test]
fn test_cli_up_rejects_subdomain_with_random() {
    cf_expose()
        .args(["up", "--subdomain", "demo", "--random"])
        .assert()
        .failure();
}

#[test]
fn test_cli_cleanup_requires_hostname() {
    cf_expose()
        .arg("cleanup")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--hostname"));
}

#[test]
fn test_cli_invalid_command() {
    cf_expose().arg("invalid-command").assert().failure();
}

#[test]
fn test_cli_config_path_uses_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");

    cf_expose()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_cli_config_init_and_get() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    cf_expose()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    cf_expose()
        .args(["config", "get", "tunnel.local_port", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("8000"));

    cf_expose()
        .args(["config", "get", "tunnel.subdomain.name", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("apiparser"));
}

#[test]
fn test_cli_check_without_credentials_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    cf_expose()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();

    isolated(&dir)
        .args(["check", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLOUDFLARE_API_TOKEN"));
}

#[test]
fn test_cli_up_without_credentials_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    cf_expose()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();

    isolated(&dir)
        .args(["up", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("credentials are incomplete"));
}

#[test]
fn test_cli_up_with_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();

    isolated(&dir)
        .args(["up", "--skip-readiness", "--config"])
        .arg(dir.path().join("missing.toml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[cfg(unix)]
#[test]
fn test_cli_up_second_signal_exits_immediately() {
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let dir = TempDir::new().unwrap();
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        format!(
            "[tunnel]\nlocal_port = {}\ngrace_period = 30\n\n[service]\nreadiness_timeout = 60\n",
            port
        ),
    )
    .unwrap();

    // The service ignores SIGTERM, so stopping it takes the full grace period
    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("cf-expose"))
        .current_dir(dir.path())
        .env("CLOUDFLARE_API_TOKEN", "test-token")
        .env("CLOUDFLARE_ACCOUNT_ID", "test-account")
        .env("CLOUDFLARE_ZONE_ID", "test-zone")
        .args(["up", "--connector", "true", "--config"])
        .arg(&path)
        .args(["--", "sh", "-c", "trap '' TERM; sleep 30"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let pid = child.id() as libc::pid_t;

    std::thread::sleep(Duration::from_secs(1));
    unsafe { libc::kill(pid, libc::SIGINT) };
    std::thread::sleep(Duration::from_millis(500));
    assert!(child.try_wait().unwrap().is_none());

    unsafe { libc::kill(pid, libc::SIGINT) };
    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "second Ctrl+C did not stop cf-expose"
        );
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(status.code(), Some(130));
}
