mod test_support;

use serde_json::json;
use test_support::{spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("fichas-router-smoke");
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").unwrap().is_null());

    // Workspace-bound methods refuse to run before a workspace is chosen.
    assert_eq!(sc.request_err("2", "fichas.list", json!({})), "no_workspace");

    sc.open_workspace(workspace.path());
    assert!(workspace.path().join("fichas.sqlite3").is_file());

    let list = sc.request_ok("3", "fichas.list", json!({}));
    assert_eq!(list["fichas"], json!([]));
    let vocab = sc.request_ok("4", "vocab.get", json!({}));
    assert_eq!(vocab["groups"].as_array().map(|a| a.len()), Some(6));
    let _ = sc.request_ok("5", "setup.get", json!({}));
    let out = workspace.path().join("smoke.csv");
    let _ = sc.request_ok(
        "6",
        "fichas.exportReport",
        json!({ "outPath": out.to_string_lossy() }),
    );
    let bundle = workspace.path().join("smoke.zip");
    let _ = sc.request_ok(
        "7",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );

    assert_eq!(sc.request_err("8", "fichas.nope", json!({})), "not_implemented");
    assert_eq!(sc.request_err("9", "fichas.get", json!({})), "bad_params");
}

#[test]
fn malformed_line_gets_bad_json_and_loop_continues() {
    use std::io::{BufRead, Write};

    let mut sc = spawn_sidecar();
    writeln!(sc.stdin, "{{not json").unwrap();
    sc.stdin.flush().unwrap();
    let mut line = String::new();
    sc.reader.read_line(&mut line).unwrap();
    let v: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(v.pointer("/error/code").and_then(|c| c.as_str()), Some("bad_json"));

    let _ = sc.request_ok("1", "health", json!({}));
}
