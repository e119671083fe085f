//! Row-by-row reconciliation of imported spreadsheets into fichas.
//!
//! Each row resolves to exactly one decision. Malformed rows never abort the
//! batch: they are skipped or have their unreadable values defaulted.

use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::debug;

use crate::aliases::{self, DATE_ALIASES, IMAGE_PATH_ALIASES, KEY_ALIASES, RATING_ALIASES};
use crate::coerce::{coerce_date, coerce_rating, coerce_text};
use crate::model::{AttributeGroup, FichaFields, GroupKind, TextField};
use crate::sheet::Row;
use crate::store;

#[derive(Clone, Copy, Debug)]
pub struct ImportOptions {
    /// Fill date used when a row has no readable date.
    pub today: NaiveDate,
    pub day_first: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportedFicha {
    pub line_no: usize,
    pub fields: FichaFields,
    pub image_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RowDecision {
    Insert(ImportedFicha),
    SkipDuplicate { line_no: usize, key: String },
    SkipMissingKey { line_no: usize },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows: usize,
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub skipped_missing_key: usize,
}

/// Business key as text. Numeric cells read back from spreadsheets often
/// carry a trailing ".0"; that artifact is dropped for all-digit keys.
pub fn normalize_key(raw: &str) -> String {
    let t = raw.trim();
    if let Some((int_part, frac)) = t.split_once('.') {
        if !int_part.is_empty()
            && int_part.chars().all(|c| c.is_ascii_digit())
            && !frac.is_empty()
            && frac.chars().all(|c| c == '0')
        {
            return int_part.to_string();
        }
    }
    t.to_string()
}

fn resolve_key(row: &Row) -> Option<String> {
    let text = coerce_text(aliases::first_present(row, KEY_ALIASES))?;
    let key = normalize_key(&text);
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

fn build_group(row: &Row, kind: GroupKind) -> AttributeGroup {
    let mut group = AttributeGroup::empty(kind);
    for flag in kind.vocabulary() {
        group.set(flag.key, aliases::resolve_flag(row, kind, flag.key));
    }
    group.set_outro(aliases::resolve_outro(row, kind));
    if kind == GroupKind::Estado && group.get("sem_encadernacao") {
        group.set("encadernada", false);
    }
    group
}

/// Assembles the canonical fields of one row under an already-resolved key.
pub fn build_record(row: &Row, key: String, opts: &ImportOptions) -> FichaFields {
    let date = coerce_date(
        aliases::first_present(row, DATE_ALIASES),
        opts.today,
        opts.day_first,
    );
    let mut fields = FichaFields::new(key, date);
    fields.avaliacao = coerce_rating(aliases::first_present(row, RATING_ALIASES));
    for f in TextField::ALL {
        fields.set_text(f, aliases::resolve_text(row, f));
    }
    for kind in GroupKind::ALL {
        fields.set_group(build_group(row, kind));
    }
    fields
}

/// Decides every row in order. `known` holds the keys present before the
/// batch and is extended as rows are accepted, so the first occurrence of a
/// key within a batch wins.
pub fn reconcile_rows(
    rows: &[Row],
    known: &mut HashSet<String>,
    opts: &ImportOptions,
) -> Vec<RowDecision> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(key) = resolve_key(row) else {
            out.push(RowDecision::SkipMissingKey {
                line_no: row.line_no,
            });
            continue;
        };
        if known.contains(&key) {
            out.push(RowDecision::SkipDuplicate {
                line_no: row.line_no,
                key,
            });
            continue;
        }

        let fields = build_record(row, key.clone(), opts);
        let image_path = coerce_text(aliases::first_present(row, IMAGE_PATH_ALIASES));
        known.insert(key);
        out.push(RowDecision::Insert(ImportedFicha {
            line_no: row.line_no,
            fields,
            image_path,
        }));
    }
    out
}

/// Reconciles and persists a batch. The caller owns the transaction.
pub fn import_rows(
    conn: &Connection,
    rows: &[Row],
    opts: &ImportOptions,
) -> anyhow::Result<ImportSummary> {
    let mut known = store::known_keys(conn)?;
    let decisions = reconcile_rows(rows, &mut known, opts);

    let mut summary = ImportSummary {
        rows: rows.len(),
        ..Default::default()
    };
    for decision in decisions {
        match decision {
            RowDecision::Insert(rec) => {
                let id = store::insert_ficha(conn, &rec.fields)
                    .with_context(|| format!("row {}", rec.line_no))?;
                if let Some(path) = rec.image_path.as_deref() {
                    store::insert_image(conn, id, path)?;
                }
                summary.inserted += 1;
            }
            RowDecision::SkipDuplicate { line_no, key } => {
                debug!(line = line_no, key = %key, "import row duplicates a known key");
                summary.skipped_duplicate += 1;
            }
            RowDecision::SkipMissingKey { line_no } => {
                debug!(line = line_no, "import row has no key");
                summary.skipped_missing_key += 1;
            }
        }
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::Rating;
    use crate::sheet::Cell;
    use tempfile::tempdir;

    fn opts() -> ImportOptions {
        ImportOptions {
            today: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            day_first: true,
        }
    }

    fn row(line_no: usize, pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(line_no, pairs.iter().map(|(k, v)| (*k, Cell::text(*v))))
    }

    fn inserted(decisions: &[RowDecision]) -> Vec<&ImportedFicha> {
        decisions
            .iter()
            .filter_map(|d| match d {
                RowDecision::Insert(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn keys_drop_float_artifacts() {
        assert_eq!(normalize_key("123.0"), "123");
        assert_eq!(normalize_key(" 001 "), "001");
        assert_eq!(normalize_key("12.5"), "12.5");
        assert_eq!(normalize_key("A.0"), "A.0");
        assert_eq!(normalize_key("7.00"), "7");
    }

    #[test]
    fn float_key_cell_matches_text_key() {
        let r = Row::from_pairs(2, [("id", Cell::Float(123.0))]);
        assert_eq!(resolve_key(&r).as_deref(), Some("123"));
    }

    #[test]
    fn first_occurrence_wins_within_batch() {
        let rows = vec![
            row(2, &[("id", "001"), ("espec_livro", "sim")]),
            row(3, &[("id", "001"), ("espec_livro", "nao")]),
        ];
        let mut known = HashSet::new();
        let decisions = reconcile_rows(&rows, &mut known, &opts());
        let ins = inserted(&decisions);
        assert_eq!(ins.len(), 1);
        assert!(ins[0].fields.group(GroupKind::Material).get("livro"));
        assert_eq!(
            decisions[1],
            RowDecision::SkipDuplicate {
                line_no: 3,
                key: "001".into()
            }
        );
    }

    #[test]
    fn keys_known_before_the_batch_are_skipped() {
        let rows = vec![row(2, &[("numero_ficha", "55")])];
        let mut known: HashSet<String> = ["55".to_string()].into_iter().collect();
        let decisions = reconcile_rows(&rows, &mut known, &opts());
        assert!(matches!(decisions[0], RowDecision::SkipDuplicate { .. }));
    }

    #[test]
    fn missing_or_blank_key_is_skipped() {
        let rows = vec![row(2, &[("titulo", "Sem número")]), row(3, &[("id", "  ")])];
        let decisions = reconcile_rows(&rows, &mut HashSet::new(), &opts());
        assert_eq!(
            decisions,
            vec![
                RowDecision::SkipMissingKey { line_no: 2 },
                RowDecision::SkipMissingKey { line_no: 3 }
            ]
        );
    }

    #[test]
    fn unreadable_date_falls_back_to_run_date() {
        let rows = vec![
            row(2, &[("id", "1"), ("data_final", "não sei")]),
            row(3, &[("id", "2"), ("data_preenchimento", "05/06/2019")]),
        ];
        let decisions = reconcile_rows(&rows, &mut HashSet::new(), &opts());
        let ins = inserted(&decisions);
        assert_eq!(ins[0].fields.data_preenchimento, opts().today);
        assert_eq!(
            ins[1].fields.data_preenchimento,
            NaiveDate::from_ymd_opt(2019, 6, 5).unwrap()
        );
    }

    #[test]
    fn rating_text_and_image_resolve_through_aliases() {
        let rows = vec![row(
            2,
            &[
                ("id", "10"),
                ("estado_geral", "Bom"),
                ("autor", "Machado"),
                ("foto_path", "uploads/10.jpg"),
            ],
        )];
        let decisions = reconcile_rows(&rows, &mut HashSet::new(), &opts());
        let rec = inserted(&decisions)[0];
        assert_eq!(rec.fields.avaliacao, Rating::Bom);
        assert_eq!(rec.fields.text(TextField::Autor), Some("Machado"));
        assert_eq!(rec.image_path.as_deref(), Some("uploads/10.jpg"));
    }

    #[test]
    fn unbound_flag_clears_bound_flag() {
        let rows = vec![row(
            2,
            &[
                ("id", "3"),
                ("tipo_encadernacao", "capa solta"),
                ("estado_sem_encadernacao", "x"),
            ],
        )];
        let decisions = reconcile_rows(&rows, &mut HashSet::new(), &opts());
        let estado = inserted(&decisions)[0].fields.group(GroupKind::Estado).clone();
        assert!(estado.get("sem_encadernacao"));
        assert!(!estado.get("encadernada"));
    }

    #[test]
    fn import_rows_persists_and_counts() {
        let dir = tempdir().unwrap();
        let conn = db::open_db(dir.path()).unwrap();
        let mut existing = FichaFields::new("900", opts().today);
        existing.set_text(TextField::Titulo, Some("Antigo".into()));
        store::insert_ficha(&conn, &existing).unwrap();

        let rows = vec![
            row(2, &[("id", "001"), ("espec_livro", "sim"), ("foto", "uploads/a.png")]),
            row(3, &[("id", "001"), ("espec_livro", "nao")]),
            row(4, &[("id", "900")]),
            row(5, &[("id", "")]),
        ];
        let summary = import_rows(&conn, &rows, &opts()).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                rows: 4,
                inserted: 1,
                skipped_duplicate: 2,
                skipped_missing_key: 1
            }
        );

        let id = store::find_by_key(&conn, "001").unwrap().unwrap();
        let ficha = store::get_ficha(&conn, id).unwrap().unwrap();
        assert!(ficha.fields.group(GroupKind::Material).get("livro"));
        assert_eq!(ficha.images[0].caminho, "uploads/a.png");
    }
}
