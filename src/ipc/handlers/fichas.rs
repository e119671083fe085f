use crate::checkbox;
use crate::config;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{db_conn, get_optional_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::model::{Ficha, GroupKind, Rating, TextField};
use crate::projection::project_group;
use crate::store;
use crate::uploads;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn ficha_json(ficha: &Ficha) -> Value {
    let f = &ficha.fields;
    let mut text = Map::new();
    for field in TextField::ALL {
        text.insert(
            field.column().to_string(),
            f.text(field).map(|s| Value::String(s.to_string())).unwrap_or(Value::Null),
        );
    }
    let mut groups = Map::new();
    let mut labels = Map::new();
    for kind in GroupKind::ALL {
        let g = f.group(kind).to_json();
        labels.insert(
            kind.column().to_string(),
            Value::String(project_group(Some(&g), kind.vocabulary())),
        );
        groups.insert(kind.column().to_string(), g);
    }
    let images: Vec<Value> = ficha
        .images
        .iter()
        .map(|i| json!({ "id": i.id, "caminho": i.caminho }))
        .collect();

    json!({
        "id": ficha.id,
        "numeroFicha": f.numero_ficha,
        "avaliacao": f.avaliacao.as_i64(),
        "avaliacaoLabel": f.avaliacao.label(),
        "dataPreenchimento": f.data_preenchimento.format("%Y-%m-%d").to_string(),
        "text": text,
        "groups": groups,
        "groupLabels": labels,
        "images": images,
        "updatedAt": ficha.updated_at
    })
}

fn fichas_list(conn: &Connection) -> Result<Value, HandlerErr> {
    let fichas = store::list_fichas(conn).map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?;
    let rows: Vec<Value> = fichas
        .iter()
        .map(|f| {
            json!({
                "id": f.id,
                "numeroFicha": f.fields.numero_ficha,
                "titulo": f.fields.text(TextField::Titulo),
                "autor": f.fields.text(TextField::Autor),
                "avaliacao": f.fields.avaliacao.as_i64(),
                "dataPreenchimento": f.fields.data_preenchimento.format("%Y-%m-%d").to_string(),
                "imageCount": f.images.len()
            })
        })
        .collect();
    Ok(json!({ "fichas": rows }))
}

fn resolve_id(conn: &Connection, params: &Value) -> Result<i64, HandlerErr> {
    if let Some(id) = params.get("id").and_then(|v| v.as_i64()) {
        return Ok(id);
    }
    let Some(key) = get_optional_str(params, "numeroFicha") else {
        return Err(HandlerErr::new("bad_params", "missing id or numeroFicha"));
    };
    store::find_by_key(conn, &key)
        .map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "ficha not found")
                .with_details(json!({ "numeroFicha": key }))
        })
}

fn fichas_get(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = resolve_id(conn, params)?;
    let ficha = store::get_ficha(conn, id)
        .map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "ficha not found").with_details(json!({ "id": id })))?;
    Ok(json!({ "ficha": ficha_json(&ficha) }))
}

fn fichas_save(conn: &Connection, ws: &Path, params: &Value) -> Result<Value, HandlerErr> {
    let Some(form) = params.get("form").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::new("bad_params", "form must be an object"));
    };
    let today = chrono::Local::now().date_naive();
    let fields =
        checkbox::fields_from_form(form, today).map_err(|m| HandlerErr::new("bad_params", m))?;

    // The photo is copied before the transaction and removed again if it fails.
    let mut saved_upload: Option<String> = None;
    if let Some(photo) = get_optional_str(params, "photoPath") {
        let limits = config::upload_settings(conn).map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?;
        let photo_name = get_optional_str(params, "photoName");
        saved_upload = uploads::save_upload(
            ws,
            &PathBuf::from(&photo),
            photo_name.as_deref(),
            limits.max_bytes,
        )
        .map_err(|e| {
            HandlerErr::from_anyhow("io_failed", e).with_details(json!({ "path": photo }))
        })?;
    }

    let result = save_in_tx(conn, &fields, saved_upload.as_deref());
    let (id, created) = match result {
        Ok(v) => v,
        Err(e) => {
            if let Some(rel) = saved_upload.as_deref() {
                uploads::remove_upload(ws, rel);
            }
            return Err(e);
        }
    };
    info!(id, numero = %fields.numero_ficha, created, "ficha saved");

    Ok(json!({
        "id": id,
        "numeroFicha": fields.numero_ficha,
        "created": created,
        "image": saved_upload
    }))
}

fn save_in_tx(
    conn: &Connection,
    fields: &crate::model::FichaFields,
    image: Option<&str>,
) -> Result<(i64, bool), HandlerErr> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let existing =
        store::find_by_key(&tx, &fields.numero_ficha).map_err(|e| HandlerErr::from_anyhow("db_query_failed", e))?;
    let (id, created) = match existing {
        Some(id) => {
            store::update_ficha(&tx, id, fields).map_err(|e| HandlerErr::from_anyhow("db_update_failed", e))?;
            (id, false)
        }
        None => {
            let id = store::insert_ficha(&tx, fields).map_err(|e| HandlerErr::from_anyhow("db_insert_failed", e))?;
            (id, true)
        }
    };
    if let Some(path) = image {
        store::insert_image(&tx, id, path).map_err(|e| HandlerErr::from_anyhow("db_insert_failed", e))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok((id, created))
}

fn fichas_delete(conn: &Connection, ws: &Path, params: &Value) -> Result<Value, HandlerErr> {
    let Some(id) = params.get("id").and_then(|v| v.as_i64()) else {
        return Err(HandlerErr::new("bad_params", "missing id"));
    };
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let removed = store::delete_ficha(&tx, id).map_err(|e| HandlerErr::from_anyhow("db_delete_failed", e))?;
    let Some(paths) = removed else {
        return Err(HandlerErr::new("not_found", "ficha not found").with_details(json!({ "id": id })));
    };
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    for p in &paths {
        uploads::remove_upload(ws, p);
    }
    info!(id, images = paths.len(), "ficha deleted");
    Ok(json!({ "deletedImages": paths.len() }))
}

fn vocab_json() -> Value {
    let groups: Vec<Value> = GroupKind::ALL
        .iter()
        .map(|k| {
            let flags: Vec<Value> = k
                .vocabulary()
                .iter()
                .map(|f| json!({ "key": f.key, "label": f.label }))
                .collect();
            json!({
                "column": k.column(),
                "prefix": k.form_prefix(),
                "title": k.title(),
                "flags": flags
            })
        })
        .collect();
    let ratings: Vec<Value> = [Rating::Bom, Rating::Regular, Rating::Mau]
        .iter()
        .map(|r| json!({ "value": r.as_i64(), "label": r.label() }))
        .collect();
    let text_fields: Vec<Value> = TextField::ALL
        .iter()
        .map(|f| json!({ "column": f.column(), "label": f.label() }))
        .collect();
    json!({ "groups": groups, "ratings": ratings, "textFields": text_fields })
}

fn handle_fichas_list(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match fichas_list(conn) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_fichas_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match fichas_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_fichas_save(state: &mut AppState, req: &Request) -> Value {
    let (conn, ws) = match (db_conn(state, req), workspace(state, req)) {
        (Ok(c), Ok(w)) => (c, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    match fichas_save(conn, ws, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => {
            warn!(code = error.code, message = %error.message, "fichas.save failed");
            error.response(&req.id)
        }
    }
}

fn handle_fichas_delete(state: &mut AppState, req: &Request) -> Value {
    let (conn, ws) = match (db_conn(state, req), workspace(state, req)) {
        (Ok(c), Ok(w)) => (c, w),
        (Err(resp), _) | (_, Err(resp)) => return resp,
    };
    match fichas_delete(conn, ws, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "fichas.list" => Some(handle_fichas_list(state, req)),
        "fichas.get" => Some(handle_fichas_get(state, req)),
        "fichas.save" => Some(handle_fichas_save(state, req)),
        "fichas.delete" => Some(handle_fichas_delete(state, req)),
        "vocab.get" => Some(ok(&req.id, vocab_json())),
        _ => None,
    }
}
