//! Integration tests for `esload resolve --json`.
//!
//! Every case here resolves without network access.

use std::process::Command;
use tempfile::tempdir;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "esload-cli", "--bin", "esload", "--"]);
    cmd
}

fn resolve_json(cwd: &std::path::Path, args: &[&str]) -> (bool, serde_json::Value) {
    let output = cargo_bin()
        .args(["--json", "--cwd"])
        .arg(cwd)
        .arg("resolve")
        .args(args)
        .output()
        .expect("Failed to run resolve command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let json: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("stdout should be valid JSON");
    (output.status.success(), json)
}

#[test]
fn test_resolve_relative_from_cwd() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("main.ts"), "export {};").unwrap();

    let (success, json) = resolve_json(dir.path(), &["./main.ts"]);

    assert!(success);
    assert_eq!(json["ok"], true);
    assert_eq!(json["resolved"]["kind"], "esm");
    let specifier = json["resolved"]["specifier"].as_str().unwrap();
    assert!(specifier.starts_with("file://"), "{specifier}");
    assert!(specifier.ends_with("/main.ts"), "{specifier}");
}

#[test]
fn test_resolve_through_import_map() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("deno.json"),
        r#"{ "imports": { "std/": "https://deno.land/std@0.224.0/" } }"#,
    )
    .unwrap();

    let (success, json) = resolve_json(dir.path(), &["std/path/mod.ts"]);

    assert!(success);
    assert_eq!(
        json["resolved"]["specifier"],
        "https://deno.land/std@0.224.0/path/mod.ts"
    );
}

#[test]
fn test_resolve_node_builtin() {
    let dir = tempdir().unwrap();
    let (success, json) = resolve_json(dir.path(), &["node:path"]);

    assert!(success);
    assert_eq!(json["resolved"]["kind"], "node");
    assert_eq!(json["resolved"]["path"], "path");
}

#[test]
fn test_resolve_external() {
    let dir = tempdir().unwrap();
    let (success, json) = resolve_json(
        dir.path(),
        &["--external", "https://esm.sh/*", "https://esm.sh/react"],
    );

    assert!(success);
    assert_eq!(json["resolved"]["kind"], "external");
}

#[test]
fn test_unmapped_bare_specifier_is_null() {
    let dir = tempdir().unwrap();
    let (success, json) = resolve_json(dir.path(), &["lodash"]);

    assert!(success);
    assert_eq!(json["ok"], true);
    assert!(json["resolved"].is_null());
}

#[test]
fn test_jsr_without_lockfile_fails() {
    let dir = tempdir().unwrap();
    let (success, json) = resolve_json(dir.path(), &["jsr:@std/path@^1.0.0"]);

    assert!(!success);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "LOCKFILE_MISSING");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("deno.lock"));
}

#[test]
fn test_invalid_npm_specifier() {
    let dir = tempdir().unwrap();
    let (success, json) = resolve_json(dir.path(), &["npm:@"]);

    assert!(!success);
    assert_eq!(json["error"]["code"], "SPECIFIER_INVALID");
}

#[test]
fn test_error_codes_are_screaming_snake_case() {
    let dir = tempdir().unwrap();
    let (_, json) = resolve_json(dir.path(), &["jsr:@std/path"]);

    let code = json["error"]["code"].as_str().unwrap();
    assert!(
        code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
        "{code}"
    );
}
