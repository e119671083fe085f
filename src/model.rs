use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// JSON key holding a group's free-text overflow entry.
pub const OUTRO_KEY: &str = "outro_texto";

#[derive(Clone, Copy, Debug)]
pub struct Flag {
    pub key: &'static str,
    pub label: &'static str,
}

const fn flag(key: &'static str, label: &'static str) -> Flag {
    Flag { key, label }
}

const MATERIAL: &[Flag] = &[
    flag("album", "Álbum"),
    flag("folheto", "Folheto"),
    flag("manuscrito", "Manuscrito"),
    flag("planta", "Planta"),
    flag("brochura", "Brochura"),
    flag("gravura", "Gravura"),
    flag("mapa", "Mapa"),
    flag("pergaminho", "Pergaminho"),
    flag("certificado", "Certificado"),
    flag("impresso", "Impresso"),
    flag("partitura", "Partitura"),
    flag("desenho", "Desenho"),
    flag("livro", "Livro"),
    flag("periodico", "Periódico"),
];

const SUPORTE: &[Flag] = &[
    flag("couche", "Couché"),
    flag("jornal", "Jornal"),
    flag("feito_mao", "Feito à mão"),
    flag("madeira", "Pasta de madeira"),
];

const ESTADO: &[Flag] = &[
    flag("encadernada", "Encadernada"),
    flag("sem_encadernacao", "Sem encadernação"),
    flag("inteira", "Inteira"),
    flag("meia_com_cantos", "Meia com cantos"),
    flag("meia_sem_cantos", "Meia sem cantos"),
];

const DETERIORACOES: &[Flag] = &[
    flag("abrasao", "Abrasão"),
    flag("costura_fragil", "Costura frágil"),
    flag("mancha", "Mancha"),
    flag("rompimento", "Rompimento"),
    flag("arranhao", "Arranhão"),
    flag("descoloracao", "Descoloração"),
    flag("perda_lombada", "Perda de lombada"),
    flag("sujidades", "Sujidades"),
];

const TRATAMENTO_PLANOS: &[Flag] = &[
    flag("diagnostico", "Diagnóstico"),
    flag("retirada_sujidades", "Retirada de sujidades"),
    flag("trincha", "Trincha"),
    flag("higienizacao", "Higienização"),
    flag("retirada_fitas", "Retirada de fitas"),
    flag("po_borracha", "Pó de borracha"),
    flag("desacidificacao", "Desacidificação"),
    flag("arrefecimento", "Arrefecimento"),
    flag("reestruturacao", "Reestruturação"),
    flag("remendos", "Remendos"),
    flag("enxertos", "Enxertos"),
    flag("velaturas", "Velaturas"),
    flag("planificacao", "Planificação"),
    flag("acondicionamento", "Acondicionamento"),
    flag("portfolio", "Portfólio"),
    flag("passe_partout", "Passe-partout"),
    flag("pasta", "Pasta"),
    flag("envelope", "Envelope"),
    flag("jaqueta", "Jaqueta"),
];

const TRATAMENTO_VOLUMES: &[Flag] = &[
    flag("fumigacao", "Fumigação"),
    flag("fungos", "Fungos"),
    flag("insetos", "Insetos"),
    flag("higienizacao", "Higienização"),
    flag("trincha", "Trincha"),
    flag("reestruturacao", "Reestruturação"),
    flag("lombada", "Lombada"),
    flag("lombada_capa", "Lombada e capa"),
    flag("folhas", "Folhas"),
    flag("encadernacao", "Encadernação"),
    flag("inteira", "Inteira"),
    flag("meia_sem_cantos", "Meia sem cantos"),
    flag("costura", "Costura"),
    flag("douracao", "Douração"),
    flag("punho", "Punho"),
    flag("maquina", "Máquina"),
    flag("acondicionamento", "Acondicionamento"),
    flag("caixa_cruz", "Caixa em cruz"),
    flag("caixa_cadarco", "Caixa com cadarço"),
];

/// The six attribute groups a ficha carries, each stored as one JSON column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    Material,
    Suporte,
    Estado,
    Deterioracoes,
    TratamentoPlanos,
    TratamentoVolumes,
}

impl GroupKind {
    pub const ALL: [GroupKind; 6] = [
        GroupKind::Material,
        GroupKind::Suporte,
        GroupKind::Estado,
        GroupKind::Deterioracoes,
        GroupKind::TratamentoPlanos,
        GroupKind::TratamentoVolumes,
    ];

    /// Database column (and JSON key) of the group.
    pub fn column(self) -> &'static str {
        match self {
            Self::Material => "especificacao_material",
            Self::Suporte => "tipo_suporte",
            Self::Estado => "estado_conservacao",
            Self::Deterioracoes => "deterioracoes",
            Self::TratamentoPlanos => "tratamento_planos",
            Self::TratamentoVolumes => "tratamento_volumes",
        }
    }

    /// Prefix of the flattened checkbox fields the form submits.
    pub fn form_prefix(self) -> &'static str {
        match self {
            Self::Material => "material",
            Self::Suporte => "suporte",
            Self::Estado => "estado",
            Self::Deterioracoes => "det",
            Self::TratamentoPlanos => "trat_plano",
            Self::TratamentoVolumes => "trat_vol",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Material => "Especificação do Material",
            Self::Suporte => "Tipo de Suporte",
            Self::Estado => "Estado de Conservação",
            Self::Deterioracoes => "Deteriorações",
            Self::TratamentoPlanos => "Tratamento (Planos)",
            Self::TratamentoVolumes => "Tratamento (Volumes)",
        }
    }

    pub fn vocabulary(self) -> &'static [Flag] {
        match self {
            Self::Material => MATERIAL,
            Self::Suporte => SUPORTE,
            Self::Estado => ESTADO,
            Self::Deterioracoes => DETERIORACOES,
            Self::TratamentoPlanos => TRATAMENTO_PLANOS,
            Self::TratamentoVolumes => TRATAMENTO_VOLUMES,
        }
    }
}

/// Python-like truthiness for loosely typed JSON values.
pub fn json_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// One attribute group: every vocabulary flag mapped to true/false, plus an
/// optional free-text "other" entry. Both the form and import paths build
/// groups through this type so the stored JSON shape is identical.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeGroup {
    pub kind: GroupKind,
    flags: BTreeMap<&'static str, bool>,
    pub outro_texto: Option<String>,
}

impl AttributeGroup {
    pub fn empty(kind: GroupKind) -> Self {
        let flags = kind.vocabulary().iter().map(|f| (f.key, false)).collect();
        Self {
            kind,
            flags,
            outro_texto: None,
        }
    }

    /// Sets a vocabulary flag. Keys outside the vocabulary are dropped.
    pub fn set(&mut self, key: &str, value: bool) {
        if let Some(f) = self.kind.vocabulary().iter().find(|f| f.key == key) {
            self.flags.insert(f.key, value);
        }
    }

    pub fn get(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    pub fn set_outro(&mut self, text: Option<String>) {
        self.outro_texto = text.filter(|s| !s.is_empty());
    }

    #[cfg(test)]
    pub fn true_flags(&self) -> Vec<&'static str> {
        self.kind
            .vocabulary()
            .iter()
            .filter(|f| self.get(f.key))
            .map(|f| f.key)
            .collect()
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        for (k, v) in &self.flags {
            obj.insert((*k).to_string(), Value::Bool(*v));
        }
        if let Some(outro) = &self.outro_texto {
            obj.insert(OUTRO_KEY.to_string(), Value::String(outro.clone()));
        }
        Value::Object(obj)
    }

    /// Lenient decode of a stored group. Missing or malformed entries read as
    /// false; unknown keys are dropped.
    pub fn from_json(kind: GroupKind, value: &Value) -> Self {
        let mut group = Self::empty(kind);
        let Some(obj) = value.as_object() else {
            return group;
        };
        for f in kind.vocabulary() {
            if let Some(v) = obj.get(f.key) {
                group.flags.insert(f.key, json_truthy(v));
            }
        }
        group.set_outro(obj.get(OUTRO_KEY).and_then(|v| v.as_str()).map(str::to_string));
        group
    }
}

/// Overall condition rating. Stored as 1/2/3.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rating {
    Bom,
    #[default]
    Regular,
    Mau,
}

impl Rating {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Bom => 1,
            Self::Regular => 2,
            Self::Mau => 3,
        }
    }

    pub fn from_i64(n: i64) -> Self {
        match n {
            1 => Self::Bom,
            3 => Self::Mau,
            _ => Self::Regular,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bom => "Bom",
            Self::Regular => "Regular",
            Self::Mau => "Mau",
        }
    }
}

/// Free-text descriptive fields of a ficha.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextField {
    Autor,
    Titulo,
    Registro,
    NChamada,
    SecaoGuarda,
    DataObra,
    Paginas,
    Dimensoes,
    Observacoes,
    TecnicoNome,
}

impl TextField {
    pub const ALL: [TextField; 10] = [
        TextField::Autor,
        TextField::Titulo,
        TextField::Registro,
        TextField::NChamada,
        TextField::SecaoGuarda,
        TextField::DataObra,
        TextField::Paginas,
        TextField::Dimensoes,
        TextField::Observacoes,
        TextField::TecnicoNome,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::Autor => "autor",
            Self::Titulo => "titulo",
            Self::Registro => "registro",
            Self::NChamada => "n_chamada",
            Self::SecaoGuarda => "secao_guarda",
            Self::DataObra => "data_obra",
            Self::Paginas => "paginas",
            Self::Dimensoes => "dimensoes",
            Self::Observacoes => "observacoes",
            Self::TecnicoNome => "tecnico_nome",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Autor => "Autor",
            Self::Titulo => "Título",
            Self::Registro => "Registro",
            Self::NChamada => "Nº de Chamada",
            Self::SecaoGuarda => "Seção de Guarda",
            Self::DataObra => "Data da Obra",
            Self::Paginas => "Páginas",
            Self::Dimensoes => "Dimensões",
            Self::Observacoes => "Observações",
            Self::TecnicoNome => "Técnico",
        }
    }
}

/// Everything a ficha holds apart from its surrogate id and images.
#[derive(Clone, Debug, PartialEq)]
pub struct FichaFields {
    pub numero_ficha: String,
    pub avaliacao: Rating,
    pub data_preenchimento: NaiveDate,
    text: BTreeMap<&'static str, String>,
    groups: Vec<AttributeGroup>,
}

impl FichaFields {
    pub fn new(numero_ficha: impl Into<String>, data_preenchimento: NaiveDate) -> Self {
        Self {
            numero_ficha: numero_ficha.into(),
            avaliacao: Rating::default(),
            data_preenchimento,
            text: BTreeMap::new(),
            groups: GroupKind::ALL.iter().map(|k| AttributeGroup::empty(*k)).collect(),
        }
    }

    pub fn text(&self, field: TextField) -> Option<&str> {
        self.text.get(field.column()).map(String::as_str)
    }

    /// Empty strings are stored as absent.
    pub fn set_text(&mut self, field: TextField, value: Option<String>) {
        match value.filter(|s| !s.is_empty()) {
            Some(v) => {
                self.text.insert(field.column(), v);
            }
            None => {
                self.text.remove(field.column());
            }
        }
    }

    pub fn group(&self, kind: GroupKind) -> &AttributeGroup {
        let idx = GroupKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &self.groups[idx]
    }

    pub fn group_mut(&mut self, kind: GroupKind) -> &mut AttributeGroup {
        let idx = GroupKind::ALL.iter().position(|k| *k == kind).unwrap_or(0);
        &mut self.groups[idx]
    }

    pub fn set_group(&mut self, group: AttributeGroup) {
        let kind = group.kind;
        *self.group_mut(kind) = group;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub id: i64,
    pub ficha_id: i64,
    pub caminho: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Ficha {
    pub id: i64,
    pub fields: FichaFields,
    pub images: Vec<Image>,
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_group_lists_every_vocabulary_flag_as_false() {
        let g = AttributeGroup::empty(GroupKind::Suporte).to_json();
        assert_eq!(
            g,
            json!({ "couche": false, "jornal": false, "feito_mao": false, "madeira": false })
        );
    }

    #[test]
    fn unknown_flags_are_dropped() {
        let mut g = AttributeGroup::empty(GroupKind::Suporte);
        g.set("papiro", true);
        assert!(g.true_flags().is_empty());
        assert!(g.to_json().get("papiro").is_none());
    }

    #[test]
    fn from_json_tolerates_malformed_values() {
        let g = AttributeGroup::from_json(
            GroupKind::Deterioracoes,
            &json!({ "mancha": "yes", "abrasao": null, "extra": true, "outro_texto": 12 }),
        );
        assert!(g.get("mancha"));
        assert!(!g.get("abrasao"));
        assert_eq!(g.outro_texto, None);

        let g = AttributeGroup::from_json(GroupKind::Deterioracoes, &json!("garbage"));
        assert_eq!(g, AttributeGroup::empty(GroupKind::Deterioracoes));
    }

    #[test]
    fn rating_round_trips_through_integers() {
        for r in [Rating::Bom, Rating::Regular, Rating::Mau] {
            assert_eq!(Rating::from_i64(r.as_i64()), r);
        }
        assert_eq!(Rating::from_i64(9), Rating::Regular);
    }
}
