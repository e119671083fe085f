use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "fichas.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fichas(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            numero_ficha TEXT NOT NULL,
            avaliacao INTEGER NOT NULL DEFAULT 2,
            autor TEXT,
            titulo TEXT,
            registro TEXT,
            n_chamada TEXT,
            secao_guarda TEXT,
            data_obra TEXT,
            paginas TEXT,
            dimensoes TEXT,
            especificacao_material TEXT NOT NULL DEFAULT '{}',
            tipo_suporte TEXT NOT NULL DEFAULT '{}',
            estado_conservacao TEXT NOT NULL DEFAULT '{}',
            deterioracoes TEXT NOT NULL DEFAULT '{}',
            tratamento_planos TEXT NOT NULL DEFAULT '{}',
            tratamento_volumes TEXT NOT NULL DEFAULT '{}',
            observacoes TEXT,
            tecnico_nome TEXT,
            data_preenchimento TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_fichas_numero ON fichas(numero_ficha)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS imagens(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            caminho TEXT NOT NULL,
            ficha_id INTEGER NOT NULL,
            FOREIGN KEY(ficha_id) REFERENCES fichas(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_imagens_ficha ON imagens(ficha_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    ensure_fichas_updated_at(&conn)?;
    // Older databases kept a single photo path on the ficha itself.
    migrate_foto_path_to_imagens(&conn)?;

    Ok(conn)
}

fn ensure_fichas_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "fichas", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE fichas ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn migrate_foto_path_to_imagens(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "fichas", "foto_path")? {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO imagens(caminho, ficha_id)
         SELECT f.foto_path, f.id
         FROM fichas f
         WHERE f.foto_path IS NOT NULL
           AND TRIM(f.foto_path) <> ''
           AND NOT EXISTS (
             SELECT 1 FROM imagens i WHERE i.ficha_id = f.id AND i.caminho = f.foto_path
           )",
        [],
    )?;
    conn.execute(
        "UPDATE fichas SET foto_path = NULL WHERE foto_path IS NOT NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
