//! End-to-end tests for the `syncql` shell binary

use assert_cmd::Command;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join("syncql.toml");
    fs::write(
        &path,
        format!(
            "[database]\nname = \"{}\"\ndirectory = \"{}\"\n\n[logging]\nlevel = \"error\"\n",
            name,
            dir.display()
        ),
    )
    .unwrap();
    path
}

fn run_script(dir: &Path, script: &str) -> (String, String, bool) {
    let config = write_config(dir, "cli");
    let output = Command::cargo_bin("syncql")
        .unwrap()
        .arg(&config)
        .write_stdin(script)
        .output()
        .unwrap();
    (
        String::from_utf8(output.stdout).unwrap(),
        String::from_utf8(output.stderr).unwrap(),
        output.status.success(),
    )
}

#[test]
fn test_shell_session() {
    let dir = TempDir::new().unwrap();
    let script = concat!(
        ":open\n",
        "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);\n",
        ":run [\"x\"] INSERT INTO t(v) VALUES(?)\n",
        ":select [\"x\"] SELECT v FROM t WHERE v = ?\n",
        ":set [{\"statement\": \"INSERT INTO t(v) VALUES(?)\", \"values\": [\"a\"]}, ",
        "{\"statement\": \"INSERT INTO missing_table(v) VALUES(?)\", \"values\": [\"b\"]}]\n",
        "SELECT count(*) AS n FROM t\n",
        ":quit\n",
    );

    let (stdout, stderr, success) = run_script(dir.path(), script);
    assert!(success, "stderr: {}", stderr);

    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[1].starts_with("opened "));
    assert_eq!(lines[2], "changes: 0");
    assert_eq!(lines[3], r#"{"changes":1,"lastId":1}"#);
    assert_eq!(lines[4], r#"{"v":"x"}"#);
    assert_eq!(lines[5], "(1 rows)");
    assert_eq!(lines[6], r#"{"changes":-1,"lastId":-1}"#);
    assert_eq!(lines[7], r#"{"n":1}"#);
    assert!(stderr.contains("batch member 1 failed"));
    assert!(dir.path().join("cliSQLite.db").exists());
}

#[test]
fn test_sync_commands() {
    let dir = TempDir::new().unwrap();
    let script = ":open\n:synctable\n:synctable\n:syncdate\n:getsyncdate\n";

    let (stdout, stderr, success) = run_script(dir.path(), script);
    assert!(success, "stderr: {}", stderr);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[2], "changes: 1");
    assert_eq!(lines[3], "changes: 0");
    assert_eq!(lines[4], "sync date set: true");
    assert!(lines[5].starts_with("sync date: "));
}

#[test]
fn test_export_then_import() {
    let dir = TempDir::new().unwrap();
    let export_path = dir.path().join("export.json");
    let script = format!(
        ":open\nCREATE TABLE t (id INTEGER PRIMARY KEY NOT NULL, v TEXT); INSERT INTO t VALUES (1, 'a');\n:export full {path}\n:delete\n:open\n:import {path}\n:select SELECT v FROM t\n",
        path = export_path.display()
    );

    let (stdout, stderr, success) = run_script(dir.path(), &script);
    assert!(success, "stderr: {}", stderr);
    assert!(export_path.exists());
    assert!(stdout.contains("exported to"));
    assert!(stdout.contains("deleted"));
    assert!(stdout.contains(r#"{"v":"a"}"#));
}

#[test]
fn test_commands_before_open_fail() {
    let dir = TempDir::new().unwrap();
    let (stdout, stderr, success) = run_script(dir.path(), "SELECT 1\n:bogus\n");
    assert!(success);
    assert_eq!(stdout.lines().count(), 1);
    assert!(stderr.contains("Database not open"));
    assert!(stderr.contains("unknown command :bogus"));
}

#[test]
fn test_missing_config_file_fails() {
    Command::cargo_bin("syncql")
        .unwrap()
        .arg("/nonexistent/syncql.toml")
        .write_stdin("")
        .assert()
        .failure();
}
