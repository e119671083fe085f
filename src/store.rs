//! Ficha persistence over an explicit connection. Callers own the
//! transaction boundary.

use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};

use crate::model::{AttributeGroup, Ficha, FichaFields, GroupKind, Image, Rating, TextField};

const DATE_FMT: &str = "%Y-%m-%d";

fn now_stamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn select_columns() -> String {
    let mut cols: Vec<&str> = vec!["id", "numero_ficha", "avaliacao", "data_preenchimento"];
    cols.extend(TextField::ALL.iter().map(|f| f.column()));
    cols.extend(GroupKind::ALL.iter().map(|k| k.column()));
    cols.push("updated_at");
    cols.join(", ")
}

fn ficha_from_row(row: &Row<'_>) -> rusqlite::Result<Ficha> {
    let id: i64 = row.get("id")?;
    let numero: String = row.get("numero_ficha")?;
    let date_raw: String = row.get("data_preenchimento")?;
    // Hand-edited rows may carry other spellings; those read as today.
    let date = NaiveDate::parse_from_str(&date_raw, DATE_FMT)
        .unwrap_or_else(|_| chrono::Local::now().date_naive());

    let mut fields = FichaFields::new(numero, date);
    fields.avaliacao = Rating::from_i64(row.get::<_, Option<i64>>("avaliacao")?.unwrap_or(2));
    for f in TextField::ALL {
        fields.set_text(f, row.get::<_, Option<String>>(f.column())?);
    }
    for kind in GroupKind::ALL {
        let raw: Option<String> = row.get(kind.column())?;
        let value = raw
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .unwrap_or(serde_json::Value::Null);
        fields.set_group(AttributeGroup::from_json(kind, &value));
    }

    Ok(Ficha {
        id,
        fields,
        images: Vec::new(),
        updated_at: row.get("updated_at")?,
    })
}

pub fn known_keys(conn: &Connection) -> anyhow::Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT numero_ficha FROM fichas")?;
    let keys = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(keys)
}

pub fn find_by_key(conn: &Connection, numero_ficha: &str) -> anyhow::Result<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM fichas WHERE numero_ficha = ?",
            [numero_ficha],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn group_json(fields: &FichaFields, kind: GroupKind) -> anyhow::Result<String> {
    Ok(serde_json::to_string(&fields.group(kind).to_json())?)
}

pub fn insert_ficha(conn: &Connection, fields: &FichaFields) -> anyhow::Result<i64> {
    let stamp = now_stamp();
    conn.execute(
        "INSERT INTO fichas(numero_ficha, avaliacao, data_preenchimento, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        params![
            fields.numero_ficha,
            fields.avaliacao.as_i64(),
            fields.data_preenchimento.format(DATE_FMT).to_string(),
            stamp,
            stamp
        ],
    )
    .with_context(|| format!("insert ficha {}", fields.numero_ficha))?;
    let id = conn.last_insert_rowid();
    write_details(conn, id, fields)?;
    Ok(id)
}

pub fn update_ficha(conn: &Connection, id: i64, fields: &FichaFields) -> anyhow::Result<()> {
    let changed = conn
        .execute(
            "UPDATE fichas
             SET numero_ficha = ?, avaliacao = ?, data_preenchimento = ?, updated_at = ?
             WHERE id = ?",
            params![
                fields.numero_ficha,
                fields.avaliacao.as_i64(),
                fields.data_preenchimento.format(DATE_FMT).to_string(),
                now_stamp(),
                id
            ],
        )
        .with_context(|| format!("update ficha {}", id))?;
    if changed == 0 {
        anyhow::bail!("ficha {} not found", id);
    }
    write_details(conn, id, fields)
}

fn write_details(conn: &Connection, id: i64, fields: &FichaFields) -> anyhow::Result<()> {
    for f in TextField::ALL {
        let sql = format!("UPDATE fichas SET {} = ? WHERE id = ?", f.column());
        conn.execute(&sql, params![fields.text(f), id])?;
    }
    for kind in GroupKind::ALL {
        let sql = format!("UPDATE fichas SET {} = ? WHERE id = ?", kind.column());
        conn.execute(&sql, params![group_json(fields, kind)?, id])?;
    }
    Ok(())
}

pub fn get_ficha(conn: &Connection, id: i64) -> anyhow::Result<Option<Ficha>> {
    let sql = format!("SELECT {} FROM fichas WHERE id = ?", select_columns());
    let ficha = conn.query_row(&sql, [id], ficha_from_row).optional()?;
    let Some(mut ficha) = ficha else {
        return Ok(None);
    };
    ficha.images = list_images(conn, id)?;
    Ok(Some(ficha))
}

/// All fichas, most recently created first, with their images.
pub fn list_fichas(conn: &Connection) -> anyhow::Result<Vec<Ficha>> {
    let sql = format!(
        "SELECT {} FROM fichas ORDER BY id DESC",
        select_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut fichas = stmt
        .query_map([], ficha_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_ficha: HashMap<i64, Vec<Image>> = HashMap::new();
    let mut img_stmt = conn.prepare("SELECT id, ficha_id, caminho FROM imagens ORDER BY id")?;
    let images = img_stmt.query_map([], |r| {
        Ok(Image {
            id: r.get(0)?,
            ficha_id: r.get(1)?,
            caminho: r.get(2)?,
        })
    })?;
    for img in images {
        let img = img?;
        by_ficha.entry(img.ficha_id).or_default().push(img);
    }
    for f in &mut fichas {
        f.images = by_ficha.remove(&f.id).unwrap_or_default();
    }
    Ok(fichas)
}

pub fn insert_image(conn: &Connection, ficha_id: i64, caminho: &str) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO imagens(caminho, ficha_id) VALUES(?, ?)",
        params![caminho, ficha_id],
    )
    .with_context(|| format!("insert image for ficha {}", ficha_id))?;
    Ok(conn.last_insert_rowid())
}

pub fn list_images(conn: &Connection, ficha_id: i64) -> anyhow::Result<Vec<Image>> {
    let mut stmt =
        conn.prepare("SELECT id, ficha_id, caminho FROM imagens WHERE ficha_id = ? ORDER BY id")?;
    let images = stmt
        .query_map([ficha_id], |r| {
            Ok(Image {
                id: r.get(0)?,
                ficha_id: r.get(1)?,
                caminho: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(images)
}

/// Deletes a ficha and its image rows. Returns the removed image paths so the
/// caller can clean up files once the transaction commits; `None` when the
/// ficha does not exist.
pub fn delete_ficha(conn: &Connection, id: i64) -> anyhow::Result<Option<Vec<String>>> {
    let exists = conn
        .query_row("SELECT 1 FROM fichas WHERE id = ?", [id], |_| Ok(()))
        .optional()?
        .is_some();
    if !exists {
        return Ok(None);
    }
    let paths = list_images(conn, id)?
        .into_iter()
        .map(|i| i.caminho)
        .collect::<Vec<_>>();
    conn.execute("DELETE FROM imagens WHERE ficha_id = ?", [id])?;
    conn.execute("DELETE FROM fichas WHERE id = ?", [id])?;
    Ok(Some(paths))
}
