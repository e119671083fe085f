use crate::config;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, get_optional_str, get_required_str};
use crate::ipc::types::{AppState, Request};
use crate::projection::{preferred_columns, project_record};
use crate::report::{self, ReportFormat, ReportOptions};
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

fn fichas_export_report(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let out_path = get_required_str(params, "outPath")?;
    let out = PathBuf::from(&out_path);
    let settings = config::report_settings(conn)
        .map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?;

    // Explicit format, then the file extension, then the configured default.
    let format = match get_optional_str(params, "format") {
        Some(s) => ReportFormat::parse(&s)
            .ok_or_else(|| HandlerErr::new("bad_params", "format must be one of: xlsx, csv"))?,
        None => ReportFormat::from_path(&out).unwrap_or(settings.default_format),
    };

    let fichas = store::list_fichas(conn)
        .map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?;
    let rows: Vec<Vec<(String, String)>> = fichas.iter().map(project_record).collect();

    let opts = ReportOptions {
        format,
        max_column_width: settings.max_column_width,
        sheet_name: settings.sheet_name,
    };
    let summary = report::write_report(&rows, &preferred_columns(), &out, &opts).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": out_path }))
    })?;
    info!(path = %out_path, rows = summary.row_count, "report exported");

    Ok(json!({
        "path": out_path,
        "rowCount": summary.row_count,
        "columns": summary.columns
    }))
}

fn handle_fichas_export_report(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match fichas_export_report(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "fichas.exportReport" => Some(handle_fichas_export_report(state, req)),
        _ => None,
    }
}
