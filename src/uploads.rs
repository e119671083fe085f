use anyhow::Context;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

pub const UPLOADS_DIR: &str = "uploads";
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

pub fn allowed_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

/// Reduces a client-supplied name to ASCII letters, digits, `.`, `-` and `_`
/// with no path components. Accented letters lose their accent.
pub fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let mut out = String::with_capacity(base.len());
    for ch in base.chars() {
        let mapped = match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            c if c.is_whitespace() => '_',
            _ => continue,
        };
        out.push(mapped);
    }
    out.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// `{YYYYmmddHHMMSS}_{8 hex}_{sanitized}`.
pub fn generated_name(original_name: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let rand = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", stamp, &rand[..8], secure_filename(original_name))
}

/// Copies a photo into the workspace upload directory.
///
/// Returns the workspace-relative path, or `None` when the file is rejected
/// (missing, disallowed extension, over the size limit). Rejections never
/// fail the caller; copy failures do.
pub fn save_upload(
    workspace: &Path,
    source: &Path,
    original_name: Option<&str>,
    max_bytes: Option<u64>,
) -> anyhow::Result<Option<String>> {
    let name = original_name
        .map(str::to_string)
        .or_else(|| {
            source
                .file_name()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        })
        .unwrap_or_default();

    if !allowed_file(&name) || secure_filename(&name).is_empty() {
        warn!(name = %name, "upload rejected: extension not allowed");
        return Ok(None);
    }
    let meta = match std::fs::metadata(source) {
        Ok(m) if m.is_file() => m,
        _ => {
            warn!(path = %source.display(), "upload rejected: file not found");
            return Ok(None);
        }
    };
    if let Some(limit) = max_bytes {
        if meta.len() > limit {
            warn!(size = meta.len(), limit, "upload rejected: file too large");
            return Ok(None);
        }
    }

    let dir = workspace.join(UPLOADS_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let file_name = generated_name(&name);
    let dst = dir.join(&file_name);
    std::fs::copy(source, &dst).with_context(|| {
        format!(
            "failed to copy upload from {} to {}",
            source.to_string_lossy(),
            dst.to_string_lossy()
        )
    })?;
    info!(path = %dst.display(), "upload saved");
    Ok(Some(format!("{}/{}", UPLOADS_DIR, file_name)))
}

/// Best-effort removal of a stored upload. Paths outside the upload
/// directory are left alone.
pub fn remove_upload(workspace: &Path, relative: &str) {
    let Some(name) = relative.strip_prefix(&format!("{}/", UPLOADS_DIR)) else {
        warn!(path = relative, "not removing image outside uploads");
        return;
    };
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        warn!(path = relative, "not removing image outside uploads");
        return;
    }
    let full = workspace.join(UPLOADS_DIR).join(name);
    if let Err(e) = std::fs::remove_file(&full) {
        warn!(path = %full.display(), error = %e, "failed to remove image");
    }
}
