//! Column-alias tables for historical spreadsheet exports.
//!
//! Every canonical field maps to an ordered list of source column names and
//! the first column present in a row wins. The newest export scheme is listed
//! first; older schemes follow as compatibility aliases.

use crate::coerce::{coerce_boolean, coerce_text};
use crate::model::{GroupKind, TextField};
use crate::sheet::{Cell, Row};

pub const KEY_ALIASES: &[&str] = &["id", "numero_ficha", "n_ficha"];
pub const DATE_ALIASES: &[&str] = &["data_final", "data_preenchimento"];
pub const RATING_ALIASES: &[&str] = &["estado_geral", "avaliacao"];
pub const IMAGE_PATH_ALIASES: &[&str] = &["foto_path", "caminho_foto", "foto", "imagem"];
/// Free-text binding classification that replaced the per-type boolean columns.
pub const BINDING_TYPE_ALIASES: &[&str] = &["tipo_encadernacao", "encadernacao_tipo"];

pub fn text_aliases(field: TextField) -> &'static [&'static str] {
    match field {
        TextField::Autor => &["autor", "autoria"],
        TextField::Titulo => &["titulo", "obra"],
        TextField::Registro => &["registro", "n_registro", "num_registro"],
        TextField::NChamada => &["n_chamada", "numero_chamada", "chamada"],
        TextField::SecaoGuarda => &["secao_guarda", "secao", "local_guarda"],
        TextField::DataObra => &["data_obra", "data_publicacao", "ano"],
        TextField::Paginas => &["paginas", "n_paginas", "num_paginas"],
        TextField::Dimensoes => &["dimensoes", "dimensao", "medidas"],
        TextField::Observacoes => &["observacoes", "obs", "observacao"],
        TextField::TecnicoNome => &["tecnico_nome", "tecnico", "responsavel"],
    }
}

/// Column prefixes used for a group's flags across export schemes, newest
/// first. The form prefix is always accepted.
pub fn import_prefixes(kind: GroupKind) -> &'static [&'static str] {
    match kind {
        GroupKind::Material => &["espec", "material", "especificacao"],
        GroupKind::Suporte => &["suporte", "tipo_suporte"],
        GroupKind::Estado => &["estado", "enc"],
        GroupKind::Deterioracoes => &["det", "deterioracao"],
        GroupKind::TratamentoPlanos => &["trat_plano", "tratamento_plano"],
        GroupKind::TratamentoVolumes => &["trat_vol", "tratamento_volume"],
    }
}

/// Older spellings of the same flag column.
const LEGACY_RENAMES: &[(GroupKind, &str, &[&str])] = &[
    (GroupKind::Material, "periodico", &["espec_periodicos"]),
    (GroupKind::Suporte, "feito_mao", &["suporte_feito_a_mao"]),
    (GroupKind::Suporte, "madeira", &["suporte_pasta_madeira"]),
    (GroupKind::Deterioracoes, "sujidades", &["det_sujidade"]),
    (GroupKind::Deterioracoes, "perda_lombada", &["det_perda_de_lombada"]),
    (GroupKind::TratamentoPlanos, "passe_partout", &["trat_plano_passepartout"]),
];

/// Flags split over several legacy columns; each extra set is OR'd in.
const LEGACY_MERGES: &[(GroupKind, &str, &[&str])] = &[
    (GroupKind::Deterioracoes, "mancha", &["det_mancha_encadernacao", "det_mancha_capa"]),
    (GroupKind::Deterioracoes, "mancha", &["det_mancha_miolo"]),
    (GroupKind::Deterioracoes, "rompimento", &["det_rompimento_miolo"]),
];

/// Substring tests against the binding-type column, used only when no
/// dedicated boolean column for the flag exists in the sheet.
const BINDING_TEXT_FALLBACKS: &[(GroupKind, &str, &[&str])] = &[
    (
        GroupKind::Estado,
        "encadernada",
        &["encadernada", "inteira", "meia", "holandesa", "capa"],
    ),
    (GroupKind::Estado, "inteira", &["inteira"]),
    (GroupKind::Estado, "meia_com_cantos", &["com cantos", "holandesa"]),
    (GroupKind::Estado, "meia_sem_cantos", &["sem cantos"]),
    (
        GroupKind::Estado,
        "sem_encadernacao",
        &["sem encaderna", "nao encaderna", "não encaderna"],
    ),
];

/// Returns the first alias present in the row. Presence means the column
/// exists, even when the cell is blank.
pub fn first_present<'r, S: AsRef<str>>(row: &'r Row, aliases: &[S]) -> Option<&'r Cell> {
    aliases.iter().find_map(|a| row.get(a.as_ref()))
}

pub fn resolve_text(row: &Row, field: TextField) -> Option<String> {
    coerce_text(first_present(row, text_aliases(field)))
}

/// Ordered alias sets for one flag. Values from each set are OR'd together.
pub fn flag_alias_sets(kind: GroupKind, flag: &str) -> Vec<Vec<String>> {
    let mut primary = prefixed_names(kind, flag);
    for (k, f, names) in LEGACY_RENAMES {
        if *k == kind && *f == flag {
            primary.extend(names.iter().map(|n| n.to_string()));
        }
    }

    let mut sets = vec![primary];
    for (k, f, names) in LEGACY_MERGES {
        if *k == kind && *f == flag {
            sets.push(names.iter().map(|n| n.to_string()).collect());
        }
    }
    sets
}

pub fn outro_aliases(kind: GroupKind) -> Vec<String> {
    prefixed_names(kind, "outro")
}

fn prefixed_names(kind: GroupKind, suffix: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for p in import_prefixes(kind).iter().copied().chain([kind.form_prefix()]) {
        let name = format!("{}_{}", p, suffix);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

pub fn text_fallback(kind: GroupKind, flag: &str) -> Option<&'static [&'static str]> {
    BINDING_TEXT_FALLBACKS
        .iter()
        .find(|(k, f, _)| *k == kind && *f == flag)
        .map(|(_, _, needles)| *needles)
}

/// Resolves one group flag from a row.
///
/// Dedicated columns win whenever any of them exists. Otherwise a configured
/// free-text fallback is consulted; any matching substring sets the flag.
pub fn resolve_flag(row: &Row, kind: GroupKind, flag: &str) -> bool {
    let mut seen = false;
    let mut value = false;
    for set in flag_alias_sets(kind, flag) {
        if let Some(cell) = first_present(row, &set) {
            seen = true;
            value |= coerce_boolean(Some(cell));
        }
    }
    if seen {
        return value;
    }

    let Some(needles) = text_fallback(kind, flag) else {
        return false;
    };
    let Some(text) = coerce_text(first_present(row, BINDING_TYPE_ALIASES)) else {
        return false;
    };
    let lowered = text.to_lowercase();
    needles.iter().any(|n| lowered.contains(n))
}

pub fn resolve_outro(row: &Row, kind: GroupKind) -> Option<String> {
    coerce_text(first_present(row, &outro_aliases(kind)))
}
