//! Integration tests for the tiller CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[assembly]
name = "SimpleProject"

[[context]]
name = "SimpleProject.SimpleContext"
database_url = "sqlite://app.db"

[[context.entity]]
name = "Blog"
table = "blogs"
primary_key = ["id"]

[[context.entity.column]]
name = "id"
sql_type = "INTEGER"

[[context.entity.column]]
name = "name"
sql_type = "TEXT"
nullable = true
"#;

/// Get the tiller binary
#[allow(deprecated)]
fn tiller_cmd() -> Command {
    let mut cmd = Command::cargo_bin("tiller").unwrap();
    cmd.env_remove("TILLER_DEBUG").env_remove("TILLER_LOG_LEVEL");
    cmd
}

/// A project with `tiller.toml` and one manifest assembly under `bin/`.
fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("bin")).unwrap();
    fs::write(dir.path().join("bin/SimpleProject.assembly.toml"), MANIFEST).unwrap();
    fs::write(
        dir.path().join("tiller.toml"),
        "[project]\nassembly = \"bin/SimpleProject.assembly.toml\"\n",
    )
    .unwrap();
    dir
}

fn in_project(dir: &Path) -> Command {
    let mut cmd = tiller_cmd();
    cmd.current_dir(dir);
    cmd
}

#[test]
fn test_help_command() {
    tiller_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tiller"))
        .stdout(predicate::str::contains("context"))
        .stdout(predicate::str::contains("migration"))
        .stdout(predicate::str::contains("database"));
}

#[test]
fn test_version_command() {
    tiller_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("Version"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_migration_help() {
    tiller_cmd()
        .args(["migration", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("script"));
}

#[test]
fn test_missing_assembly_fails() {
    let dir = TempDir::new().unwrap();
    in_project(dir.path())
        .args(["context", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No assembly given"));
}

#[test]
fn test_context_list_and_info() {
    let dir = project();

    in_project(dir.path())
        .args(["context", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SimpleProject.SimpleContext"));

    in_project(dir.path())
        .args(["context", "info", "-c", "Simple"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SimpleProject.SimpleContext, SimpleProject"));
}

#[test]
fn test_unknown_context_fails() {
    let dir = project();
    in_project(dir.path())
        .args(["context", "info", "--context", "Missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No context type named 'Missing'"));
}

#[test]
fn test_assembly_flag_without_config() {
    let dir = project();
    fs::remove_file(dir.path().join("tiller.toml")).unwrap();

    in_project(dir.path())
        .args(["--assembly", "bin/SimpleProject.assembly.toml", "context", "list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"full_name\": \"SimpleProject.SimpleContext\""));
}

#[test]
fn test_add_update_and_status() {
    let dir = project();

    in_project(dir.path())
        .args(["migration", "add", "InitialCreate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Migration 'InitialCreate' created"));

    let migrations = dir.path().join("bin/Migrations");
    assert_eq!(fs::read_dir(&migrations).unwrap().count(), 3);
    assert!(migrations.join("SimpleContextModelSnapshot.toml").is_file());

    in_project(dir.path())
        .args(["migration", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_InitialCreate"));

    in_project(dir.path())
        .args(["migration", "list", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 applied, 1 pending"));

    in_project(dir.path())
        .args(["database", "update"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 applied"));
    assert!(dir.path().join("bin/app.db").is_file());

    in_project(dir.path())
        .args(["migration", "list", "--status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 applied, 0 pending"));

    in_project(dir.path())
        .args(["database", "update"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already up to date"));

    in_project(dir.path())
        .args(["database", "update", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 reverted"));
}

#[test]
fn test_script_to_stdout_and_file() {
    let dir = project();

    in_project(dir.path())
        .args(["migration", "add", "InitialCreate"])
        .assert()
        .success();

    in_project(dir.path())
        .args(["migration", "script"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- Migration"))
        .stdout(predicate::str::contains("CREATE TABLE \"blogs\""));

    in_project(dir.path())
        .args(["migration", "script", "-o", "out/update.sql"])
        .assert()
        .success();

    let script = fs::read_to_string(dir.path().join("out/update.sql")).unwrap();
    assert!(script.contains("\"blogs\""));
    // Scripting never touches the database.
    assert!(!dir.path().join("bin/app.db").exists());
}

#[test]
fn test_bad_migration_name_fails() {
    let dir = project();
    in_project(dir.path())
        .args(["migration", "add", "bad-name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid migration name"));
}

#[test]
fn test_idempotent_script_rejected_for_sqlite() {
    let dir = project();

    in_project(dir.path())
        .args(["migration", "add", "InitialCreate"])
        .assert()
        .success();

    in_project(dir.path())
        .args(["migration", "script", "--idempotent", "-o", "update.sql"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported by the sqlite generator"));
    assert!(!dir.path().join("update.sql").exists());
}

#[test]
fn test_add_rejects_migrations_dir_the_assembly_does_not_load() {
    let dir = project();
    fs::write(
        dir.path().join("tiller.toml"),
        "[project]\nassembly = \"bin/SimpleProject.assembly.toml\"\nmigrations_dir = \"Elsewhere\"\n",
    )
    .unwrap();

    in_project(dir.path())
        .args(["migration", "add", "InitialCreate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("where assembly 'SimpleProject' loads migrations from"));
    assert!(!dir.path().join("bin/Elsewhere").exists());

    in_project(dir.path())
        .args(["migration", "add", "InitialCreate", "-o", "bin/Migrations"])
        .assert()
        .success();

    in_project(dir.path())
        .args(["migration", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_InitialCreate"));
}
