use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::db::DB_FILE_NAME;
use crate::uploads::UPLOADS_DIR;

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/fichas.sqlite3";
pub const BUNDLE_FORMAT: &str = "fichasd-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub upload_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub upload_count: usize,
}

fn sha256_file(path: &Path) -> anyhow::Result<String> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut f, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.to_string_lossy()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn upload_files(workspace_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let dir = workspace_path.join(UPLOADS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for ent in std::fs::read_dir(&dir)
        .with_context(|| format!("failed to list {}", dir.to_string_lossy()))?
    {
        let p = ent?.path();
        if p.is_file() {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let uploads = upload_files(workspace_path)?;
    let db_sha256 = sha256_file(&db_path)?;

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
        "uploadCount": uploads.len(),
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    for path in &uploads {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        zip.start_file(format!("{}/{}", UPLOADS_DIR, name), opts)
            .with_context(|| format!("failed to start upload entry {}", name))?;
        let mut f = File::open(path)
            .with_context(|| format!("failed to open upload {}", path.to_string_lossy()))?;
        std::io::copy(&mut f, &mut zip)
            .with_context(|| format!("failed to write upload entry {}", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;
    info!(path = %out_path.display(), uploads = uploads.len(), "workspace bundle exported");

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 2 + uploads.len(),
        upload_count: uploads.len(),
    })
}

pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE_NAME);

    if !is_zip_file(in_path)? {
        std::fs::copy(in_path, &dst).with_context(|| {
            format!(
                "failed to copy sqlite backup from {} to {}",
                in_path.to_string_lossy(),
                dst.to_string_lossy()
            )
        })?;
        return Ok(ImportSummary {
            bundle_format_detected: "sqlite3".to_string(),
            upload_count: 0,
        });
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    let mut db_out = File::create(&tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/fichas.sqlite3")?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    }
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    drop(db_out);

    if let Some(expected) = manifest.get("dbSha256").and_then(|v| v.as_str()) {
        let actual = sha256_file(&tmp_dst)?;
        if actual != expected {
            let _ = std::fs::remove_file(&tmp_dst);
            return Err(anyhow!(
                "database checksum mismatch: expected {}, got {}",
                expected,
                actual
            ));
        }
    }

    let upload_count = extract_uploads(&mut archive, workspace_path)?;

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;
    info!(path = %in_path.display(), uploads = upload_count, "workspace bundle imported");

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
        upload_count,
    })
}

fn extract_uploads(archive: &mut ZipArchive<File>, workspace_path: &Path) -> anyhow::Result<usize> {
    let dir = workspace_path.join(UPLOADS_DIR);
    let prefix = format!("{}/", UPLOADS_DIR);
    let mut count = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("failed to read bundle entry")?;
        if entry.is_dir() {
            continue;
        }
        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            continue;
        };
        let Some(name) = rel
            .to_str()
            .and_then(|s| s.strip_prefix(&prefix))
            .filter(|n| !n.is_empty() && !n.contains('/'))
            .map(str::to_string)
        else {
            continue;
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
        let out_path = dir.join(&name);
        let mut out = File::create(&out_path)
            .with_context(|| format!("failed to create {}", out_path.to_string_lossy()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("failed to extract upload {}", name))?;
        count += 1;
    }
    Ok(count)
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bundle_round_trips_database_and_uploads() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join(DB_FILE_NAME), b"not really sqlite").unwrap();
        std::fs::create_dir_all(src.path().join(UPLOADS_DIR)).unwrap();
        std::fs::write(src.path().join(UPLOADS_DIR).join("a.png"), b"img").unwrap();

        let out_dir = tempdir().unwrap();
        let bundle = out_dir.path().join("ws.zip");
        let exported = export_workspace_bundle(src.path(), &bundle).unwrap();
        assert_eq!(exported.upload_count, 1);
        assert_eq!(exported.entry_count, 3);

        let dst = tempdir().unwrap();
        let imported = import_workspace_bundle(&bundle, dst.path()).unwrap();
        assert_eq!(imported.bundle_format_detected, BUNDLE_FORMAT);
        assert_eq!(imported.upload_count, 1);
        assert_eq!(
            std::fs::read(dst.path().join(DB_FILE_NAME)).unwrap(),
            b"not really sqlite"
        );
        assert_eq!(
            std::fs::read(dst.path().join(UPLOADS_DIR).join("a.png")).unwrap(),
            b"img"
        );
    }

    #[test]
    fn foreign_bundle_format_is_rejected() {
        let dir = tempdir().unwrap();
        let bundle = dir.path().join("other.zip");
        {
            let mut zip = ZipWriter::new(File::create(&bundle).unwrap());
            zip.start_file(MANIFEST_ENTRY, FileOptions::default()).unwrap();
            zip.write_all(br#"{"format":"something-else"}"#).unwrap();
            zip.finish().unwrap();
        }
        let ws = tempdir().unwrap();
        let err = import_workspace_bundle(&bundle, ws.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported bundle format"));
    }
}
