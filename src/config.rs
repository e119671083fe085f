//! Workspace-scoped settings, stored as JSON objects in the `settings` table.

use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::db;
use crate::report::ReportFormat;
use crate::sheet::SheetFormat;

pub const DEFAULT_MAX_UPLOAD_BYTES: i64 = 10 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Import,
    Uploads,
    Reports,
}

impl SetupSection {
    pub const ALL: [SetupSection; 3] = [Self::Import, Self::Uploads, Self::Reports];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "import" => Some(Self::Import),
            "uploads" => Some(Self::Uploads),
            "reports" => Some(Self::Reports),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Uploads => "uploads",
            Self::Reports => "reports",
        }
    }

    fn key(self) -> String {
        format!("setup.{}", self.name())
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Import => json!({
            "defaultFormat": "auto",
            "dayFirst": true
        }),
        SetupSection::Uploads => json!({
            "maxBytes": DEFAULT_MAX_UPLOAD_BYTES
        }),
        SetupSection::Reports => json!({
            "defaultFormat": "xlsx",
            "maxColumnWidth": 50,
            "sheetName": "Fichas"
        }),
    }
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v.as_i64().ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

// Characters xlsx refuses in worksheet names.
const SHEET_NAME_FORBIDDEN: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            SetupSection::Import => match k.as_str() {
                "defaultFormat" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    if s != "auto" && s != "csv" && s != "xlsx" {
                        return Err("defaultFormat must be one of: auto, csv, xlsx".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "dayFirst" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown import field: {}", k)),
            },
            SetupSection::Uploads => match k.as_str() {
                "maxBytes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, i64::MAX)?));
                }
                _ => return Err(format!("unknown uploads field: {}", k)),
            },
            SetupSection::Reports => match k.as_str() {
                "defaultFormat" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    if s != "xlsx" && s != "csv" {
                        return Err("defaultFormat must be one of: xlsx, csv".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "maxColumnWidth" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 10, 120)?));
                }
                "sheetName" => {
                    let s = parse_string_max(v, k, 31)?;
                    if s.is_empty() || s.contains(SHEET_NAME_FORBIDDEN) {
                        return Err("sheetName must be non-empty without []:*?/\\".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
        }
    }
    Ok(())
}

/// Defaults overlaid with whatever saved values still validate.
pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, &section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Apply field by field so one stale value does not hide the rest.
            for (k, v) in saved_obj {
                let mut one = Map::new();
                one.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &one);
            }
        }
    }
    Ok(current)
}

pub fn update_section(
    conn: &Connection,
    section: SetupSection,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, &section.key(), &current)?;
    Ok(Ok(current))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImportSettings {
    pub default_format: SheetFormat,
    pub day_first: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadSettings {
    /// `None` means unlimited.
    pub max_bytes: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportSettings {
    pub default_format: ReportFormat,
    pub max_column_width: usize,
    pub sheet_name: String,
}

fn str_field<'a>(v: &'a Value, key: &str, fallback: &'a str) -> &'a str {
    v.get(key).and_then(|x| x.as_str()).unwrap_or(fallback)
}

pub fn import_settings(conn: &Connection) -> anyhow::Result<ImportSettings> {
    let v = load_section(conn, SetupSection::Import)?;
    Ok(ImportSettings {
        default_format: SheetFormat::parse(str_field(&v, "defaultFormat", "auto"))
            .unwrap_or(SheetFormat::Auto),
        day_first: v.get("dayFirst").and_then(|x| x.as_bool()).unwrap_or(true),
    })
}

pub fn upload_settings(conn: &Connection) -> anyhow::Result<UploadSettings> {
    let v = load_section(conn, SetupSection::Uploads)?;
    let n = v
        .get("maxBytes")
        .and_then(|x| x.as_i64())
        .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
    Ok(UploadSettings {
        max_bytes: if n <= 0 { None } else { Some(n as u64) },
    })
}

pub fn report_settings(conn: &Connection) -> anyhow::Result<ReportSettings> {
    let v = load_section(conn, SetupSection::Reports)?;
    Ok(ReportSettings {
        default_format: ReportFormat::parse(str_field(&v, "defaultFormat", "xlsx"))
            .unwrap_or(ReportFormat::Xlsx),
        max_column_width: v
            .get("maxColumnWidth")
            .and_then(|x| x.as_u64())
            .unwrap_or(50) as usize,
        sheet_name: str_field(&v, "sheetName", "Fichas").to_string(),
    })
}
