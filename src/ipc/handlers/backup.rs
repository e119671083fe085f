use crate::backup;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Explicit `workspacePath` param, else the current workspace.
fn target_workspace(state: &AppState, params: &Value) -> Result<PathBuf, HandlerErr> {
    get_optional_str(params, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn export_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let workspace_path = target_workspace(state, params)?;

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(&out_path))
        .map_err(|e| {
            HandlerErr::from_anyhow("io_failed", e).with_details(json!({ "path": out_path }))
        })?;
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "uploadCount": export.upload_count
    }))
}

fn import_bundle(state: &mut AppState, params: &Value) -> Result<Value, HandlerErr> {
    let in_path = get_required_str(params, "inPath")?;
    let workspace_path = target_workspace(state, params)?;
    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // The database file is replaced underneath any open handle.
    state.close_db();

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            if let Some(current) = state.workspace.clone() {
                let _ = state.open_workspace(&current);
            }
            return Err(HandlerErr::from_anyhow("io_failed", e)
                .with_details(json!({ "path": in_path })));
        }
    };
    state
        .open_workspace(&workspace_path)
        .map_err(|e| HandlerErr::from_anyhow("db_open_failed", e))?;

    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "uploadCount": import.upload_count
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => export_bundle(state, &req.params),
        "backup.importWorkspaceBundle" => import_bundle(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
