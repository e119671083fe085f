use crate::config;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, ImportOptions};
use crate::sheet::{self, SheetFormat};
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{info, warn};

fn fichas_import(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let in_path = get_required_str(params, "inPath")?;
    let settings = config::import_settings(conn)
        .map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?;
    let format = match get_optional_str(params, "format") {
        Some(s) => SheetFormat::parse(&s).ok_or_else(|| {
            HandlerErr::new("bad_params", "format must be one of: auto, csv, xlsx")
        })?,
        None => settings.default_format,
    };

    let path = PathBuf::from(&in_path);
    if !path.is_file() {
        return Err(HandlerErr::new("not_found", "spreadsheet not found")
            .with_details(json!({ "path": in_path })));
    }
    let rows = sheet::read_rows(&path, format).map_err(|e| {
        HandlerErr::new("parse_failed", e.to_string()).with_details(json!({ "path": in_path }))
    })?;

    let opts = ImportOptions {
        today: chrono::Local::now().date_naive(),
        day_first: settings.day_first,
    };
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let summary = reconcile::import_rows(&tx, &rows, &opts)
        .map_err(|e| HandlerErr::from_anyhow("db_insert_failed", e))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    info!(
        path = %in_path,
        rows = summary.rows,
        inserted = summary.inserted,
        skipped_duplicate = summary.skipped_duplicate,
        skipped_missing_key = summary.skipped_missing_key,
        "spreadsheet imported"
    );
    Ok(json!({
        "rows": summary.rows,
        "inserted": summary.inserted,
        "skippedDuplicate": summary.skipped_duplicate,
        "skippedMissingKey": summary.skipped_missing_key
    }))
}

fn handle_fichas_import(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match fichas_import(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            warn!(code = error.code, message = %error.message, "fichas.import failed");
            error.response(&req.id)
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "fichas.import" => Some(handle_fichas_import(state, req)),
        _ => None,
    }
}
