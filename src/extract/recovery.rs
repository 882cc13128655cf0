//! Last-resort field-by-field recovery for responses that are not valid JSON.

use super::parse_candidate;
use regex::Regex;
use serde_json::{Map, Value};

/// How list items are found in broken output.
#[derive(Debug, Clone)]
pub enum ItemPattern {
    /// Consecutive `"a": "..", "b": ".."` string pairs, e.g. FAQ entries.
    StringPairs { first: &'static str, second: &'static str },
    /// Flat `{...}` objects that carry `marker` as a key.
    FlatObjects { marker: &'static str },
}

/// A list field to rebuild from its items.
#[derive(Debug, Clone)]
pub struct ListRecovery {
    /// Key path of the list in the rebuilt object.
    pub path: Vec<&'static str>,
    pub items: ItemPattern,
}

/// Which top-level fields to recover and how many must be found.
#[derive(Debug, Clone)]
pub struct FieldRecovery {
    pub string_fields: Vec<&'static str>,
    pub lists: Vec<ListRecovery>,
    /// Minimum number of recovered fields for the strategy to succeed.
    pub min_recovered: usize,
}

const STRING_BODY: &str = r#""((?:[^"\\]|\\.)*)""#;

impl FieldRecovery {
    /// Editorial recovery: the three prose fields are essential.
    pub fn editorial() -> Self {
        Self {
            string_fields: vec!["resumo_curto", "introducao", "consideracoes_finais"],
            lists: vec![ListRecovery {
                path: vec!["perguntas_frequentes"],
                items: ItemPattern::StringPairs {
                    first: "pergunta",
                    second: "resposta",
                },
            }],
            min_recovered: 3,
        }
    }

    /// Technical recovery: both lists must be found.
    pub fn technical() -> Self {
        Self {
            string_fields: Vec::new(),
            lists: vec![
                ListRecovery {
                    path: vec!["especificacoes_por_versao"],
                    items: ItemPattern::FlatObjects {
                        marker: "medida_pneus",
                    },
                },
                ListRecovery {
                    path: vec!["tabela_carga", "condicoes"],
                    items: ItemPattern::FlatObjects { marker: "situacao" },
                },
            ],
            min_recovered: 2,
        }
    }

    /// Rebuild an object from whatever fields can be found independently.
    pub fn recover(&self, text: &str) -> Option<Value> {
        let mut root = Map::new();
        let mut recovered = 0usize;

        for field in &self.string_fields {
            if let Some(value) = recover_string(text, field) {
                root.insert(field.to_string(), Value::String(value));
                recovered += 1;
            }
        }

        for list in &self.lists {
            let items = match &list.items {
                ItemPattern::StringPairs { first, second } => {
                    recover_pairs(text, first, second)
                }
                ItemPattern::FlatObjects { marker } => recover_flat_objects(text, marker),
            };
            if items.is_empty() {
                continue;
            }
            insert_at_path(&mut root, &list.path, Value::Array(items));
            recovered += 1;
        }

        if recovered == 0 || recovered < self.min_recovered {
            return None;
        }
        Some(Value::Object(root))
    }
}

fn recover_string(text: &str, field: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*{STRING_BODY}"#, regex::escape(field));
    let re = Regex::new(&pattern).ok()?;
    let body = re.captures(text)?.get(1)?.as_str();
    let value = unescape(body);
    if value.trim().is_empty() {
        return None;
    }
    Some(value)
}

fn recover_pairs(text: &str, first: &str, second: &str) -> Vec<Value> {
    let pattern = format!(
        r#""{}"\s*:\s*{STRING_BODY}\s*,\s*"{}"\s*:\s*{STRING_BODY}"#,
        regex::escape(first),
        regex::escape(second)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let a = unescape(caps.get(1)?.as_str());
            let b = unescape(caps.get(2)?.as_str());
            let mut item = Map::new();
            item.insert(first.to_string(), Value::String(a));
            item.insert(second.to_string(), Value::String(b));
            Some(Value::Object(item))
        })
        .collect()
}

fn recover_flat_objects(text: &str, marker: &str) -> Vec<Value> {
    let Ok(re) = Regex::new(r"\{[^{}]*\}") else {
        return Vec::new();
    };
    re.find_iter(text)
        .filter_map(|m| parse_candidate(m.as_str()))
        .filter(|value| value.get(marker).is_some())
        .collect()
}

fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut cursor = root;
    for key in parents {
        let entry = cursor
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        cursor = next;
    }
    cursor.insert(last.to_string(), value);
}

/// Decode JSON string escapes; fall back to the raw body on bad escapes.
fn unescape(body: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{body}\"")).unwrap_or_else(|_| body.to_string())
}
