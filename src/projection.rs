//! Expands stored groups back into readable text for reports and views.

use serde_json::Value;

use crate::model::{json_truthy, Ficha, Flag, GroupKind, TextField, OUTRO_KEY};

pub const LABEL_SEPARATOR: &str = ", ";
pub const IMAGE_SEPARATOR: &str = "; ";

/// Labels of the true flags in vocabulary order, then `Outro: <text>` when an
/// overflow entry is present. Absent or malformed data projects to "".
pub fn project_group(group: Option<&Value>, vocabulary: &[Flag]) -> String {
    let Some(obj) = group.and_then(|g| g.as_object()) else {
        return String::new();
    };
    let mut parts: Vec<String> = vocabulary
        .iter()
        .filter(|f| obj.get(f.key).map(json_truthy).unwrap_or(false))
        .map(|f| f.label.to_string())
        .collect();
    if let Some(outro) = obj.get(OUTRO_KEY).and_then(|v| v.as_str()) {
        let outro = outro.trim();
        if !outro.is_empty() {
            parts.push(format!("Outro: {}", outro));
        }
    }
    parts.join(LABEL_SEPARATOR)
}

pub const NUMERO_COLUMN: &str = "Nº Ficha";
pub const AVALIACAO_COLUMN: &str = "Avaliação";
pub const DATA_COLUMN: &str = "Data de Preenchimento";
pub const IMAGENS_COLUMN: &str = "Imagens";

/// Report column order. Columns not listed here follow in first-seen order.
pub fn preferred_columns() -> Vec<String> {
    let mut cols = vec![NUMERO_COLUMN.to_string()];
    cols.extend(
        TextField::ALL
            .iter()
            .filter(|f| !matches!(f, TextField::Observacoes | TextField::TecnicoNome))
            .map(|f| f.label().to_string()),
    );
    cols.push(AVALIACAO_COLUMN.to_string());
    cols.extend(GroupKind::ALL.iter().map(|k| k.title().to_string()));
    cols.push(TextField::Observacoes.label().to_string());
    cols.push(TextField::TecnicoNome.label().to_string());
    cols.push(DATA_COLUMN.to_string());
    cols.push(IMAGENS_COLUMN.to_string());
    cols
}

/// One flat report row. Empty text fields are left out so the writer can
/// drop columns no ficha uses.
pub fn project_record(ficha: &Ficha) -> Vec<(String, String)> {
    let f = &ficha.fields;
    let mut out = vec![(NUMERO_COLUMN.to_string(), f.numero_ficha.clone())];
    for field in TextField::ALL {
        if let Some(v) = f.text(field) {
            out.push((field.label().to_string(), v.to_string()));
        }
    }
    out.push((AVALIACAO_COLUMN.to_string(), f.avaliacao.label().to_string()));
    for kind in GroupKind::ALL {
        let json = f.group(kind).to_json();
        out.push((
            kind.title().to_string(),
            project_group(Some(&json), kind.vocabulary()),
        ));
    }
    out.push((
        DATA_COLUMN.to_string(),
        f.data_preenchimento.format("%d/%m/%Y").to_string(),
    ));
    if !ficha.images.is_empty() {
        let paths: Vec<&str> = ficha.images.iter().map(|i| i.caminho.as_str()).collect();
        out.push((IMAGENS_COLUMN.to_string(), paths.join(IMAGE_SEPARATOR)));
    }
    out
}
