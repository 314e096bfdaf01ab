use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

fn tenantscan_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tenantscan"));
    cmd.env("HOME", home);
    cmd.env_remove("TENANTSCAN_CONFIG");
    cmd.env_remove("TENANTSCAN_LOG");
    cmd.env_remove("TENANTSCAN_RUN_TIMEOUT_SECS");
    cmd.env_remove("TENANTSCAN_RUN_EXCLUDE");
    cmd.env_remove("TENANTSCAN_REPORT_FORMATS");
    cmd.env_remove("TENANTSCAN_REPORT_OUTPUT_DIR");
    cmd.env_remove("TENANTSCAN_UI_COLOR");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    tenantscan_cmd(home).args(args).output().expect("run tenantscan")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);

    let temp = std::env::temp_dir();
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let uniq = format!("tenantscan-exit-test-{}-{seq}", std::process::id());
    let home = temp.join(uniq);
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn empty_export(home: &Path) -> String {
    let path = home.join("tenant.json");
    std::fs::write(&path, b"{}").expect("write export");
    path.display().to_string()
}

#[test]
fn unknown_exclude_is_invalid_args() {
    let home = make_temp_home();
    let tenant = empty_export(&home);
    let out = run(&home, &["assess", "--tenant", &tenant, "--exclude", "payroll"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown domain: payroll"), "{stderr}");
}

#[test]
fn missing_tenant_export_is_invalid_args() {
    let home = make_temp_home();
    let missing = home.join("nope.json");
    let out = run(
        &home,
        &["assess", "--tenant", missing.to_str().expect("utf8 path")],
    );
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn malformed_tenant_export_is_invalid_args() {
    let home = make_temp_home();
    let path = home.join("broken.json");
    std::fs::write(&path, b"{ not json").expect("write");
    let out = run(&home, &["assess", "--tenant", path.to_str().expect("utf8 path")]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn unknown_completion_shell_is_invalid_args() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "powershell-core"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn completion_for_bash_succeeds() {
    let home = make_temp_home();
    let out = run(&home, &["completion", "bash"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("tenantscan"));
}

#[test]
fn unwritable_output_is_report_failed() {
    let home = make_temp_home();
    let tenant = empty_export(&home);
    let blocker = home.join("not-a-dir");
    std::fs::write(&blocker, b"file").expect("write blocker");

    let out = run(
        &home,
        &[
            "--json",
            "assess",
            "--tenant",
            &tenant,
            "--output",
            blocker.to_str().expect("utf8 path"),
        ],
    );
    assert_eq!(out.status.code(), Some(20));

    // The summary is still printed before the failure is reported.
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(
        v.get("reportFailures")
            .and_then(|f| f.as_array())
            .map(|f| f.len()),
        Some(3)
    );
}

#[test]
fn invalid_config_file_is_invalid_args() {
    let home = make_temp_home();
    let cfg = home.join(".config/tenantscan/config.toml");
    std::fs::create_dir_all(cfg.parent().expect("parent")).expect("mkdirs");
    std::fs::write(&cfg, b"[run]\nmax_concurrent_domains = 0\n").expect("write config");

    let out = run(&home, &["domains"]);
    assert_eq!(out.status.code(), Some(2));
}
