//! Typed phase payloads.
//!
//! Raw `serde_json::Value` only exists between the extractor and
//! [`PhasePayload::decode`]; everything past that point is typed. Decoding is
//! lenient about representation (numeric strings, stringified lists) and
//! strict about structure; range checks belong to `validation`.

use crate::error::{EnrichError, EnrichResult};
use crate::record::EnrichmentPhase;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phase-specific payload decoded from model output.
pub trait PhasePayload: Serialize + DeserializeOwned + Clone + std::fmt::Debug {
    const PHASE: EnrichmentPhase;

    /// Decode an extracted JSON value into the typed payload.
    fn decode(raw: Value) -> EnrichResult<Self> {
        if !raw.is_object() {
            return Err(EnrichError::parse(format!(
                "{} payload must be a JSON object",
                Self::PHASE
            )));
        }
        serde_json::from_value(raw).map_err(|err| {
            EnrichError::parse(format!("decode {} payload: {err}", Self::PHASE))
        })
    }
}

/// Editorial fields: summary, introduction, closing, FAQ.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorialPayload {
    #[serde(rename = "resumo_curto", default)]
    pub short_summary: String,
    #[serde(rename = "introducao", default)]
    pub introduction: String,
    #[serde(rename = "consideracoes_finais", default)]
    pub closing: String,
    #[serde(
        rename = "perguntas_frequentes",
        default,
        deserialize_with = "lenient::list"
    )]
    pub faq: Vec<FaqEntry>,
}

impl PhasePayload for EditorialPayload {
    const PHASE: EnrichmentPhase = EnrichmentPhase::Editorial;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaqEntry {
    #[serde(rename = "pergunta", default)]
    pub question: String,
    #[serde(rename = "resposta", default)]
    pub answer: String,
}

/// Technical fields: per-trim specifications and a load table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalPayload {
    #[serde(
        rename = "especificacoes_por_versao",
        default,
        deserialize_with = "lenient::list"
    )]
    pub variant_specs: Vec<VariantSpec>,
    #[serde(
        rename = "tabela_carga",
        default,
        deserialize_with = "lenient::optional_object",
        skip_serializing_if = "Option::is_none"
    )]
    pub load_table: Option<LoadTable>,
}

impl PhasePayload for TechnicalPayload {
    const PHASE: EnrichmentPhase = EnrichmentPhase::Technical;
}

/// Tire specification for one trim. Pressures are PSI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    #[serde(rename = "versao", default)]
    pub variant_name: String,
    #[serde(rename = "medida_pneus", default)]
    pub tire_size: String,
    #[serde(
        rename = "pressao_dianteiro_normal",
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub front_normal: Option<i64>,
    #[serde(
        rename = "pressao_traseiro_normal",
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub rear_normal: Option<i64>,
    #[serde(
        rename = "pressao_dianteiro_carregado",
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub front_loaded: Option<i64>,
    #[serde(
        rename = "pressao_traseiro_carregado",
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub rear_loaded: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadTable {
    #[serde(rename = "titulo", default)]
    pub title: String,
    #[serde(rename = "condicoes", default, deserialize_with = "lenient::list")]
    pub conditions: Vec<LoadCondition>,
}

/// Recommended pressure for one trim under one load situation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadCondition {
    #[serde(rename = "versao", default)]
    pub variant_name: String,
    #[serde(rename = "situacao", default)]
    pub situation: String,
    #[serde(
        rename = "pressao_dianteira",
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub front: Option<i64>,
    #[serde(
        rename = "pressao_traseira",
        default,
        deserialize_with = "lenient::integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub rear: Option<i64>,
}

/// Where a persisted payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMeta {
    pub source: PayloadSource,
    /// Attempts spent, including failed ones.
    pub attempts: u32,
    /// Attempt whose output was accepted; `None` for fallback payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_on_attempt: Option<u32>,
    /// Soft-accept notes from validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub generated_at_ms: u64,
}

/// A validated payload plus provenance, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutput<T> {
    pub meta: PayloadMeta,
    pub content: T,
}

mod lenient {
    use serde::de::{DeserializeOwned, Error};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accept integers, integral floats, and numeric strings ("32", "32 psi").
    ///
    /// Anything else becomes `None` so validation can report it by field.
    pub fn integer<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(coerce_integer(&value))
    }

    fn coerce_integer(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => {
                let trimmed = s.trim();
                let lower = trimmed.to_ascii_lowercase();
                let digits = lower.strip_suffix("psi").unwrap_or(&lower).trim();
                digits.parse::<i64>().ok()
            }
            _ => None,
        }
    }

    /// Accept a JSON array, a string holding a serialized array, or null.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        let value = match value {
            Value::Null => return Ok(Vec::new()),
            Value::String(text) => serde_json::from_str(text.trim())
                .map_err(|_| D::Error::custom("expected a list, found plain text"))?,
            other => other,
        };
        if !value.is_array() {
            return Err(D::Error::custom("expected a list"));
        }
        serde_json::from_value(value).map_err(D::Error::custom)
    }

    /// Accept a JSON object, a string holding a serialized object, or null.
    pub fn optional_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Value::deserialize(deserializer)?;
        let value = match value {
            Value::Null => return Ok(None),
            Value::String(text) => serde_json::from_str(text.trim())
                .map_err(|_| D::Error::custom("expected an object, found plain text"))?,
            other => other,
        };
        if !value.is_object() {
            return Err(D::Error::custom("expected an object"));
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn technical_payload_accepts_numeric_strings_and_floats() {
        let raw = json!({
            "especificacoes_por_versao": [{
                "versao": "Comfortline 200 TSI",
                "medida_pneus": "195/55 R16",
                "pressao_dianteiro_normal": "32",
                "pressao_traseiro_normal": 30.0,
                "pressao_dianteiro_carregado": "35 PSI"
            }]
        });
        let payload = TechnicalPayload::decode(raw).expect("decode");
        let spec = &payload.variant_specs[0];
        assert_eq!(spec.front_normal, Some(32));
        assert_eq!(spec.rear_normal, Some(30));
        assert_eq!(spec.front_loaded, Some(35));
        assert_eq!(spec.rear_loaded, None);
        assert!(payload.load_table.is_none());
    }

    #[test]
    fn fractional_pressure_is_left_for_validation() {
        let raw = json!({
            "especificacoes_por_versao": [{
                "versao": "Highline", "medida_pneus": "205/50 R17",
                "pressao_dianteiro_normal": 32.5, "pressao_traseiro_normal": "alta"
            }]
        });
        let payload = TechnicalPayload::decode(raw).expect("decode");
        assert_eq!(payload.variant_specs[0].front_normal, None);
        assert_eq!(payload.variant_specs[0].rear_normal, None);
    }

    #[test]
    fn stringified_faq_list_is_decoded() {
        let raw = json!({
            "resumo_curto": "Resumo",
            "perguntas_frequentes": "[{\"pergunta\": \"Qual?\", \"resposta\": \"Esta.\"}]"
        });
        let payload = EditorialPayload::decode(raw).expect("decode");
        assert_eq!(payload.faq.len(), 1);
        assert_eq!(payload.faq[0].question, "Qual?");
    }

    #[test]
    fn plain_text_list_is_a_parse_failure() {
        let raw = json!({"perguntas_frequentes": "veja abaixo"});
        let err = EditorialPayload::decode(raw).unwrap_err();
        assert!(matches!(err, EnrichError::ParseFailure(_)));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = TechnicalPayload::decode(json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("must be a JSON object"));
    }

    #[test]
    fn phase_output_roundtrips_with_source_flag() {
        let output = PhaseOutput {
            meta: PayloadMeta {
                source: PayloadSource::Fallback,
                attempts: 3,
                accepted_on_attempt: None,
                warnings: Vec::new(),
                generated_at_ms: 1,
            },
            content: EditorialPayload::default(),
        };
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["meta"]["source"], json!("fallback"));
        assert!(value["meta"].get("accepted_on_attempt").is_none());
        let back: PhaseOutput<EditorialPayload> = serde_json::from_value(value).unwrap();
        assert_eq!(back, output);
    }
}
