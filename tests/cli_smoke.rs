use assert_cmd::Command;
use serde_json::Value;

fn fixture(name: &str) -> String {
    format!("{}/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn autopom(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("autopom").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("HOME", dir.path())
        .env_remove("RUST_LOG")
        .env_remove("AUTOPOM_BASE_URL")
        .env_remove("AUTOPOM_MAX_DEPTH")
        .env_remove("AUTOPOM_MAX_ACTIONS")
        .env_remove("AUTOPOM_LANGUAGE");
    cmd
}

#[test]
fn info_prints_build_details() {
    let dir = tempfile::tempdir().unwrap();
    let output = autopom(&dir).arg("info").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Version:"));
    assert!(stdout.contains("Git Commit:"));
}

#[test]
fn crawl_writes_schema_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let output = autopom(&dir)
        .args(["crawl", "--site", &fixture("shop.yaml"), "--format", "json", "--output"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["end_reason"], "completed");
    assert_eq!(summary["states"], 4);
    assert!(out.join("crawl_schema.json").exists());
    assert!(out.join("reports").join("crawl_summary.md").exists());
    assert!(out.join("models_json").join("CartPage.json").exists());
}

#[test]
fn crawl_replays_a_script() {
    let dir = tempfile::tempdir().unwrap();
    let output = autopom(&dir)
        .args([
            "crawl",
            "--site",
            &fixture("shop.yaml"),
            "--script",
            &fixture("shop-script.yaml"),
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["states"], 2);
    assert!(dir.path().join("autopom-output").join("crawl_schema.json").exists());
}

#[test]
fn missing_fixture_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let output = autopom(&dir)
        .args(["crawl", "--site", "nope.yaml"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope.yaml"));
}

#[test]
fn validate_config_redacts_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let output = autopom(&dir)
        .arg("validate-config")
        .env("AUTOPOM_USERNAME", "alice")
        .env("AUTOPOM_PASSWORD", "hunter2")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Configuration OK"));
    assert!(stdout.contains("<redacted>"));
    assert!(!stdout.contains("hunter2"));
}

#[test]
fn validate_config_rejects_a_broken_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bad.yaml");
    std::fs::write(&config, "crawl:\n  base_url: ftp://files.test/\n").unwrap();
    let output = autopom(&dir)
        .arg("--config")
        .arg(&config)
        .arg("validate-config")
        .output()
        .unwrap();
    assert!(!output.status.success());
}
