//! Integration tests for the `deckathlon` CLI binary.
//!
//! Local commands run against a schema document in a temp dir; backend
//! commands run against a wiremock server.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `deckathlon` binary with env isolation.
fn deckathlon_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("deckathlon");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("DECKATHLON_PROFILE")
        .env_remove("DECKATHLON_CONFIG")
        .env_remove("DECKATHLON_ROOT_URL")
        .env_remove("DECKATHLON_SCHEMA")
        .env_remove("DECKATHLON_USERNAME")
        .env_remove("DECKATHLON_PASSWORD");
    cmd
}

/// Page configuration with a schema and some seed data.
fn write_schema(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("schema.json");
    let document = json!({
        "schema": {
            "templates": {"key": "id", "static": true, "fklabel": "name",
                "fields": {"id": {}, "name": {}}},
            "tables": {"key": "id", "order": "name", "fields": {
                "id": {},
                "name": {"default": "New table"},
                "fk_templates": {"fk": "templates", "required": true, "null": false},
            }},
            "games": {"key": "id", "fields": {"id": {}, "fk_tables": {"fk": "tables"}}},
        },
        "data": {
            "templates": [{"id": 4, "name": "Thousand"}],
            "tables": [
                {"id": 2, "name": "Beta", "fk_templates": 4},
                {"id": 1, "name": "Alpha", "fk_templates": 4},
            ],
        }
    });
    std::fs::write(&path, document.to_string()).unwrap();
    path
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run(mut cmd: assert_cmd::Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let home = TempDir::new().unwrap();
    let output = deckathlon_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    deckathlon_cmd(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("save"))
                .and(predicate::str::contains("poll")),
        );
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    deckathlon_cmd(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("deckathlon"));
}

#[test]
fn test_no_config_fails() {
    let home = TempDir::new().unwrap();
    deckathlon_cmd(home.path())
        .args(["list", "tables"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No backend or schema configured"));
}

#[test]
fn test_missing_named_profile_fails() {
    let home = TempDir::new().unwrap();
    deckathlon_cmd(home.path())
        .args(["--profile", "nope", "types"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no profile named 'nope'"));
}

// ── Local schema ────────────────────────────────────────────────────

#[test]
fn test_types_from_schema() {
    let home = TempDir::new().unwrap();
    let schema = write_schema(&home);
    deckathlon_cmd(home.path())
        .arg("--schema")
        .arg(&schema)
        .args(["-o", "plain", "types"])
        .assert()
        .success()
        .stdout("templates\ntables\ngames\n");
}

#[test]
fn test_list_uses_schema_order() {
    let home = TempDir::new().unwrap();
    let schema = write_schema(&home);
    deckathlon_cmd(home.path())
        .arg("--schema")
        .arg(&schema)
        .args(["-o", "plain", "list", "tables"])
        .assert()
        .success()
        .stdout("1\n2\n");
}

#[test]
fn test_list_with_filter_and_sort() {
    let home = TempDir::new().unwrap();
    let schema = write_schema(&home);
    let output = deckathlon_cmd(home.path())
        .arg("--schema")
        .arg(&schema)
        .args(["-o", "json-compact", "list", "tables", "--where", "fk_templates=4"])
        .args(["--sort", "name", "--desc"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let items: Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = items
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Beta", "Alpha"]);
}

#[test]
fn test_get_unknown_item() {
    let home = TempDir::new().unwrap();
    let schema = write_schema(&home);
    let output = deckathlon_cmd(home.path())
        .arg("--schema")
        .arg(&schema)
        .args(["get", "tables", "99"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("tables #99 not found"));
}

#[test]
fn test_unknown_type_lists_known_ones() {
    let home = TempDir::new().unwrap();
    let schema = write_schema(&home);
    deckathlon_cmd(home.path())
        .arg("--schema")
        .arg(&schema)
        .args(["list", "chairs"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("templates, tables, games"));
}

#[test]
fn test_blank_prefills_required_foreign_key() {
    let home = TempDir::new().unwrap();
    let schema = write_schema(&home);
    let output = deckathlon_cmd(home.path())
        .arg("--schema")
        .arg(&schema)
        .args(["-o", "json-compact", "blank", "tables", "--require", "fk_templates"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let item: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(item, json!({"name": "New table", "fk_templates": 4}));
}

// ── Backend ─────────────────────────────────────────────────────────

fn backend_cmd(home: &TempDir, server: &MockServer) -> assert_cmd::Command {
    let schema = write_schema(home);
    let mut cmd = deckathlon_cmd(home.path());
    cmd.arg("--schema")
        .arg(schema)
        .arg("--root-url")
        .arg(format!("{}/api/", server.uri()));
    cmd
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "data": data}))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_fetches_from_backend() {
    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/tables"))
        .respond_with(ok(json!([{"id": 7, "name": "Remote", "fk_templates": 4}])))
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["-o", "plain", "list", "tables"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "7\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remove_blocked_by_related_game() {
    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/api/tables"))
        .respond_with(ok(json!([{"id": 1, "name": "Alpha", "fk_templates": 4}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/games"))
        .respond_with(ok(json!([{"id": 30, "fk_tables": 1}])))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ok(Value::Null))
        .expect(0)
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["remove", "tables", "1"]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(6));
    assert!(
        combined_output(&output).contains("Cannot delete tables item #1: there are related rows.")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_save_reports_server_error() {
    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/tables"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "Name is too long."})),
        )
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["save", "tables", r#"{"name": "x", "fk_templates": 4}"#]);
    let output = run(cmd).await;

    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("Name is too long."));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_query_logs_in_after_unauthorized() {
    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/me"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_json(json!({"username": "anna", "password": "hunter2"})))
        .respond_with(ok(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/me"))
        .respond_with(ok(json!({"id": 1, "username": "anna"})))
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.env("DECKATHLON_USERNAME", "anna")
        .env("DECKATHLON_PASSWORD", "hunter2")
        .args(["-o", "json-compact", "query", "me"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    let value: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["username"], json!("anna"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poll_prints_changes_for_n_ticks() {
    let server = MockServer::start().await;
    let home = TempDir::new().unwrap();

    Mock::given(method("POST"))
        .and(path("/api/poll"))
        .respond_with(ok(json!({"games": [{"id": 5, "fk_tables": 1}]})))
        .mount(&server)
        .await;

    let mut cmd = backend_cmd(&home, &server);
    cmd.args(["-o", "plain", "poll", "poll", "--interval", "50", "--ticks", "2"]);
    let output = run(cmd).await;

    assert!(output.status.success(), "{}", combined_output(&output));
    // Only the first tick changes the store.
    assert_eq!(String::from_utf8_lossy(&output.stdout), "games\t1\n");
}
