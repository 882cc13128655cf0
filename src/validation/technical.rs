//! Technical phase contract: per-trim specs and the load table.

use super::{Band, ValidationReport};
use crate::payload::{TechnicalPayload, VariantSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TechnicalBounds {
    pub variant_count: Band,
    pub min_variant_name_chars: usize,
    /// Inclusive PSI range for every pressure figure.
    pub pressure_psi: Band,
    /// Placeholder trim names; matched case-insensitively as substrings.
    pub forbidden_terms: Vec<String>,
}

impl Default for TechnicalBounds {
    fn default() -> Self {
        Self {
            variant_count: Band::new(3, 5),
            min_variant_name_chars: 5,
            pressure_psi: Band::new(20, 60),
            forbidden_terms: default_forbidden_terms(),
        }
    }
}

pub fn default_forbidden_terms() -> Vec<String> {
    [
        "base",
        "top",
        "standard",
        "entry",
        "básica",
        "basica",
        "intermediária",
        "intermediaria",
        "completa",
        "versão 1",
        "versao 1",
    ]
    .iter()
    .map(|term| term.to_string())
    .collect()
}

#[derive(Debug, Clone)]
pub struct TechnicalRules {
    bounds: TechnicalBounds,
    forbidden_lower: Vec<String>,
}

impl TechnicalRules {
    pub fn new(bounds: TechnicalBounds) -> Self {
        let forbidden_lower = bounds
            .forbidden_terms
            .iter()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        Self {
            bounds,
            forbidden_lower,
        }
    }

    pub fn bounds(&self) -> &TechnicalBounds {
        &self.bounds
    }

    /// First forbidden term contained in `name`, if any.
    pub fn forbidden_term_in(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        self.forbidden_lower
            .iter()
            .find(|term| lower.contains(term.as_str()))
            .map(String::as_str)
    }

    /// Check every field. The technical contract has no tolerant band, so
    /// the attempt number does not change the outcome.
    pub fn validate(&self, payload: &TechnicalPayload, _attempt: u32) -> ValidationReport {
        let mut report = ValidationReport::default();
        let specs = &payload.variant_specs;

        if !self.bounds.variant_count.contains(specs.len()) {
            report.reject(
                "especificacoes_por_versao",
                format!(
                    "has {} entries; expected {}",
                    specs.len(),
                    self.bounds.variant_count
                ),
            );
        }

        let mut seen = BTreeSet::new();
        for (idx, spec) in specs.iter().enumerate() {
            self.check_variant(idx, spec, &mut report);
            let key = spec.variant_name.trim().to_lowercase();
            if !key.is_empty() && !seen.insert(key) {
                report.reject(
                    format!("especificacoes_por_versao[{idx}].versao"),
                    format!("duplicate variant name {:?}", spec.variant_name.trim()),
                );
            }
        }

        match &payload.load_table {
            None => report.reject("tabela_carga", "is required"),
            Some(table) if table.conditions.is_empty() => {
                report.reject("tabela_carga.condicoes", "must list at least one condition")
            }
            Some(table) => {
                for (idx, condition) in table.conditions.iter().enumerate() {
                    let field = format!("tabela_carga.condicoes[{idx}]");
                    let name = condition.variant_name.trim().to_lowercase();
                    if !seen.contains(&name) {
                        report.reject(
                            format!("{field}.versao"),
                            format!(
                                "{:?} does not match any entry in especificacoes_por_versao",
                                condition.variant_name.trim()
                            ),
                        );
                    }
                    self.check_optional_pressure(
                        &format!("{field}.pressao_dianteira"),
                        condition.front,
                        &mut report,
                    );
                    self.check_optional_pressure(
                        &format!("{field}.pressao_traseira"),
                        condition.rear,
                        &mut report,
                    );
                }
            }
        }

        report
    }

    fn check_variant(&self, idx: usize, spec: &VariantSpec, report: &mut ValidationReport) {
        let field = format!("especificacoes_por_versao[{idx}]");
        let name = spec.variant_name.trim();
        if name.chars().count() < self.bounds.min_variant_name_chars {
            report.reject(
                format!("{field}.versao"),
                format!(
                    "{name:?} is shorter than {} characters",
                    self.bounds.min_variant_name_chars
                ),
            );
        }
        if let Some(term) = self.forbidden_term_in(name) {
            report.reject(
                format!("{field}.versao"),
                format!("{name:?} uses the generic term {term:?}; use the real trim name"),
            );
        }
        if spec.tire_size.trim().is_empty() {
            report.reject(format!("{field}.medida_pneus"), "is required");
        }
        self.check_required_pressure(
            &format!("{field}.pressao_dianteiro_normal"),
            spec.front_normal,
            report,
        );
        self.check_required_pressure(
            &format!("{field}.pressao_traseiro_normal"),
            spec.rear_normal,
            report,
        );
        self.check_optional_pressure(
            &format!("{field}.pressao_dianteiro_carregado"),
            spec.front_loaded,
            report,
        );
        self.check_optional_pressure(
            &format!("{field}.pressao_traseiro_carregado"),
            spec.rear_loaded,
            report,
        );
    }

    fn check_required_pressure(&self, field: &str, value: Option<i64>, report: &mut ValidationReport) {
        match value {
            None => report.reject(field, "must be an integer PSI value"),
            Some(psi) => self.check_optional_pressure(field, Some(psi), report),
        }
    }

    fn check_optional_pressure(&self, field: &str, value: Option<i64>, report: &mut ValidationReport) {
        let Some(psi) = value else {
            return;
        };
        let band = self.bounds.pressure_psi;
        let in_band = usize::try_from(psi).is_ok_and(|psi| band.contains(psi));
        if !in_band {
            report.reject(field, format!("{psi} PSI outside {band}"));
        }
    }
}
