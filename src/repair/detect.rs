//! Shape detection for renderer-facing base article fields.

use crate::extract::parse_candidate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Object,
    Array,
    Scalar,
    Null,
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Shape::Object,
            Value::Array(_) => Shape::Array,
            Value::Null => Shape::Null,
            _ => Shape::Scalar,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
            Shape::Scalar => "scalar",
            Shape::Null => "null",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape a renderer expects for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRequirement {
    pub field: String,
    pub shape: Shape,
    /// Keys that must exist once the field is object-shaped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_keys: Vec<String>,
}

impl ShapeRequirement {
    pub fn object(field: &str, required_keys: &[&str]) -> Self {
        Self {
            field: field.to_string(),
            shape: Shape::Object,
            required_keys: required_keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    pub fn array(field: &str) -> Self {
        Self {
            field: field.to_string(),
            shape: Shape::Array,
            required_keys: Vec::new(),
        }
    }

    /// The issue `value` has against this requirement, if any.
    pub fn check(&self, value: &Value) -> Option<StructuralIssue> {
        let found = Shape::of(value);
        if found != self.shape {
            return Some(StructuralIssue {
                field: self.field.clone(),
                expected: self.shape,
                found,
                missing_keys: Vec::new(),
            });
        }
        let missing_keys: Vec<String> = match value {
            Value::Object(map) => self
                .required_keys
                .iter()
                .filter(|key| !map.contains_key(key.as_str()))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        if missing_keys.is_empty() {
            None
        } else {
            Some(StructuralIssue {
                field: self.field.clone(),
                expected: self.shape,
                found,
                missing_keys,
            })
        }
    }
}

/// The renderer contract for base articles.
pub fn default_requirements() -> Vec<ShapeRequirement> {
    vec![
        ShapeRequirement::object(
            "localizacao_etiqueta",
            &["local_principal", "descricao", "locais_alternativos"],
        ),
        ShapeRequirement::array("especificacoes_por_versao"),
        ShapeRequirement::object("tabela_carga", &[]),
        ShapeRequirement::array("perguntas_frequentes"),
        ShapeRequirement::object("conversao_unidades", &[]),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuralIssue {
    pub field: String,
    pub expected: Shape,
    pub found: Shape,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_keys: Vec<String>,
}

impl fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.missing_keys.is_empty() {
            write!(
                f,
                "{}: expected {}, found {}",
                self.field, self.expected, self.found
            )
        } else {
            write!(
                f,
                "{}: {} is missing keys {}",
                self.field,
                self.expected,
                self.missing_keys.join(", ")
            )
        }
    }
}

/// Issues for present fields; absent and null fields are left to the
/// renderer's defaults.
pub fn detect_issues(
    article: &Map<String, Value>,
    requirements: &[ShapeRequirement],
) -> Vec<StructuralIssue> {
    requirements
        .iter()
        .filter_map(|requirement| match article.get(&requirement.field) {
            None | Some(Value::Null) => None,
            Some(value) => requirement.check(value),
        })
        .collect()
}

/// Decode a stringified JSON value that already satisfies `requirement`.
pub fn decode_locally(value: &Value, requirement: &ShapeRequirement) -> Option<Value> {
    let Value::String(text) = value else {
        return None;
    };
    let decoded = parse_candidate(text)?;
    requirement.check(&decoded).is_none().then_some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object fixture")
    }

    #[test]
    fn string_field_is_a_shape_issue() {
        let issues = detect_issues(
            &article(json!({
                "localizacao_etiqueta": "Na coluna da porta do motorista",
                "perguntas_frequentes": [],
            })),
            &default_requirements(),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "localizacao_etiqueta");
        assert_eq!(issues[0].found, Shape::Scalar);
        assert_eq!(
            issues[0].to_string(),
            "localizacao_etiqueta: expected object, found scalar"
        );
    }

    #[test]
    fn object_missing_sub_keys_is_an_issue() {
        let issues = detect_issues(
            &article(json!({"localizacao_etiqueta": {"local_principal": "porta"}})),
            &default_requirements(),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].missing_keys,
            vec!["descricao".to_string(), "locais_alternativos".to_string()]
        );
    }

    #[test]
    fn absent_null_and_well_shaped_fields_pass() {
        let issues = detect_issues(
            &article(json!({
                "localizacao_etiqueta": {
                    "local_principal": "porta",
                    "descricao": "etiqueta na coluna",
                    "locais_alternativos": [],
                },
                "tabela_carga": null,
                "especificacoes_por_versao": [{"versao": "LT 1.0"}],
            })),
            &default_requirements(),
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn stringified_json_decodes_locally() {
        let requirement = ShapeRequirement::array("especificacoes_por_versao");
        let value = json!("[{\"versao\": \"LT 1.0\"}]");
        assert_eq!(
            decode_locally(&value, &requirement),
            Some(json!([{"versao": "LT 1.0"}]))
        );
        assert_eq!(decode_locally(&json!("texto livre"), &requirement), None);
        // Decodes, but to the wrong shape.
        assert_eq!(decode_locally(&json!("{\"a\": 1}"), &requirement), None);
    }
}
