use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn noscroll(config_home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("noscroll").expect("noscroll binary");
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env("HOME", config_home)
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn prints_version() {
    let dir = tempdir().unwrap();
    noscroll(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    let dir = tempdir().unwrap();
    noscroll(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("noscroll").and(predicate::str::contains("--pages")));
}

#[test]
fn unknown_flag_fails_with_usage_hint() {
    let dir = tempdir().unwrap();
    noscroll(dir.path())
        .arg("--bogus")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown flag --bogus"));
}

#[test]
fn offline_run_prints_rows() {
    let dir = tempdir().unwrap();
    noscroll(dir.path())
        .args(["r/pics/hot", "--offline", "--pages", "2", "--width", "1280", "--height", "800"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("r/pics hot: showing 20 of")
                .and(predicate::str::contains("media "))
                .and(predicate::str::contains("s0 ")),
        );
}

#[test]
fn offline_curated_feed_uses_config_feeds() {
    let dir = tempdir().unwrap();
    let config_dir = dir.path().join("noscroll");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.yaml"),
        "service:\n  feeds:\n    - page_path: art\n      feed_id: \"3\"\nlogging:\n  level: warn\n",
    )
    .unwrap();
    noscroll(dir.path())
        .args(["art", "--offline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("front curated: showing 10 of 20 items"));
}
