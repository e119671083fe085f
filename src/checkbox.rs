//! Flat form submissions into canonical ficha fields.
//!
//! A form posts each checkbox as `{prefix}_{flag}`; unchecked boxes are simply
//! absent. The encoder produces the same group shape as spreadsheet import.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::coerce::coerce_rating;
use crate::model::{json_truthy, AttributeGroup, FichaFields, GroupKind, TextField};
use crate::sheet::Cell;

fn form_text(form: &Map<String, Value>, key: &str) -> Option<String> {
    let s = match form.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn encode_group(kind: GroupKind, form: &Map<String, Value>) -> AttributeGroup {
    let prefix = kind.form_prefix();
    let mut group = AttributeGroup::empty(kind);
    for flag in kind.vocabulary() {
        let checked = form
            .get(&format!("{}_{}", prefix, flag.key))
            .map(json_truthy)
            .unwrap_or(false);
        group.set(flag.key, checked);
    }
    group.set_outro(form_text(form, &format!("{}_outro", prefix)));
    group
}

/// Builds every field of a ficha from a flat form map.
///
/// `numero_ficha` is required. An absent fill date means `today`; a present
/// but malformed one is rejected.
pub fn fields_from_form(form: &Map<String, Value>, today: NaiveDate) -> Result<FichaFields, String> {
    let Some(numero) = form_text(form, "numero_ficha") else {
        return Err("numero_ficha is required".into());
    };
    let date = match form_text(form, "data_preenchimento") {
        None => today,
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map_err(|_| format!("data_preenchimento must be YYYY-MM-DD, got {:?}", s))?,
    };

    let mut fields = FichaFields::new(numero, date);
    fields.avaliacao = coerce_rating(form_text(form, "avaliacao").map(Cell::text).as_ref());
    for f in TextField::ALL {
        fields.set_text(f, form_text(form, f.column()));
    }
    for kind in GroupKind::ALL {
        fields.set_group(encode_group(kind, form));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rating;
    use serde_json::json;

    fn form(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn form_without_material_fields_has_all_material_flags_false() {
        let f = fields_from_form(&form(json!({ "numero_ficha": "042" })), today()).unwrap();
        let material = f.group(GroupKind::Material);
        assert!(material.true_flags().is_empty());
        assert_eq!(material.outro_texto, None);
        assert_eq!(
            material.to_json().as_object().unwrap().len(),
            GroupKind::Material.vocabulary().len()
        );
        assert_eq!(f.numero_ficha, "042");
        assert_eq!(f.data_preenchimento, today());
        assert_eq!(f.avaliacao, Rating::Regular);
    }

    #[test]
    fn checked_boxes_and_outro_are_encoded() {
        let g = encode_group(
            GroupKind::Deterioracoes,
            &form(json!({
                "det_mancha": "on",
                "det_abrasao": "",
                "det_sujidades": true,
                "det_outro": "  cupins ",
                "det_inexistente": "on",
                "material_livro": "on"
            })),
        );
        assert_eq!(g.true_flags(), vec!["mancha", "sujidades"]);
        assert_eq!(g.outro_texto.as_deref(), Some("cupins"));
    }

    #[test]
    fn blank_outro_is_omitted() {
        let g = encode_group(GroupKind::Suporte, &form(json!({ "suporte_outro": "   " })));
        assert_eq!(g.outro_texto, None);
        assert!(g.to_json().get("outro_texto").is_none());
    }

    #[test]
    fn missing_key_and_bad_date_are_rejected() {
        assert!(fields_from_form(&form(json!({ "titulo": "x" })), today()).is_err());
        assert!(fields_from_form(
            &form(json!({ "numero_ficha": "1", "data_preenchimento": "16/10/2026" })),
            today()
        )
        .is_err());
    }

    #[test]
    fn scalar_fields_are_read() {
        let f = fields_from_form(
            &form(json!({
                "numero_ficha": 7,
                "avaliacao": "1",
                "data_preenchimento": "2024-02-29",
                "titulo": " Dom Casmurro ",
                "paginas": 256
            })),
            today(),
        )
        .unwrap();
        assert_eq!(f.numero_ficha, "7");
        assert_eq!(f.avaliacao, Rating::Bom);
        assert_eq!(f.data_preenchimento, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(f.text(TextField::Titulo), Some("Dom Casmurro"));
        assert_eq!(f.text(TextField::Paginas), Some("256"));
    }
}
