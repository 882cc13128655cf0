//! Workspace configuration.
//!
//! `config.json` sits at the workspace root and is created by `init`. Every
//! section has defaults, unknown keys are rejected, and loading validates the
//! bands so a bad edit fails before any record is touched.

use crate::batch::BatchSettings;
use crate::llm::{LlmBackend, LlmSettings};
use crate::retry::RetrySettings;
use crate::store::WorkspacePaths;
use crate::util::write_json_atomic;
use crate::validation::{Band, EditorialBounds, TechnicalBounds, TextBounds};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub editorial: EditorialBounds,
    #[serde(default)]
    pub technical: TechnicalBounds,
    #[serde(default)]
    pub batch: BatchSettings,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        default_config()
    }
}

/// The config written by `init`.
pub fn default_config() -> EnrichConfig {
    EnrichConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        llm: LlmSettings::default(),
        retry: RetrySettings::default(),
        editorial: EditorialBounds::default(),
        technical: TechnicalBounds::default(),
        batch: BatchSettings::default(),
    }
}

/// Load and validate `config.json`; a missing file means defaults.
pub fn load_config(paths: &WorkspacePaths) -> Result<EnrichConfig> {
    let path = paths.config_path();
    if !path.exists() {
        return Ok(default_config());
    }
    let bytes = fs::read(&path).with_context(|| format!("read config {}", path.display()))?;
    let config: EnrichConfig =
        serde_json::from_slice(&bytes).context("parse workspace config JSON")?;
    validate_config(&config).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

/// Persist a config in a stable JSON format.
pub fn write_config(paths: &WorkspacePaths, config: &EnrichConfig) -> Result<()> {
    write_json_atomic(&paths.config_path(), config).context("write workspace config")
}

pub fn validate_config(config: &EnrichConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    validate_llm(&config.llm)?;

    if config.retry.max_attempts == 0 {
        return Err(anyhow!("retry.max_attempts must be at least 1"));
    }

    let editorial = &config.editorial;
    validate_text("editorial.short_summary", &editorial.short_summary)?;
    validate_text("editorial.introduction", &editorial.introduction)?;
    validate_text("editorial.closing", &editorial.closing)?;
    validate_band("editorial.faq_count", &editorial.faq_count)?;
    validate_band("editorial.faq_answer_words", &editorial.faq_answer_words)?;
    if editorial.faq_count.min == 0 {
        return Err(anyhow!("editorial.faq_count.min must be at least 1"));
    }

    let technical = &config.technical;
    validate_band("technical.variant_count", &technical.variant_count)?;
    if technical.variant_count.min == 0 {
        return Err(anyhow!("technical.variant_count.min must be at least 1"));
    }
    validate_band("technical.pressure_psi", &technical.pressure_psi)?;
    if technical.pressure_psi.min == 0 || technical.pressure_psi.max > 150 {
        return Err(anyhow!(
            "technical.pressure_psi must lie within 1-150 (got {})",
            technical.pressure_psi
        ));
    }
    if technical
        .forbidden_terms
        .iter()
        .any(|term| term.trim().is_empty())
    {
        return Err(anyhow!("technical.forbidden_terms entries must be non-empty"));
    }

    if config.batch.jobs == 0 {
        return Err(anyhow!("batch.jobs must be at least 1"));
    }
    Ok(())
}

fn validate_llm(llm: &LlmSettings) -> Result<()> {
    if llm.model.trim().is_empty() {
        return Err(anyhow!("llm.model must be non-empty"));
    }
    if llm.max_tokens == 0 {
        return Err(anyhow!("llm.max_tokens must be positive"));
    }
    if !(0.0..=1.0).contains(&llm.temperature) {
        return Err(anyhow!(
            "llm.temperature must lie within 0.0-1.0 (got {})",
            llm.temperature
        ));
    }
    if llm.timeout_secs == 0 {
        return Err(anyhow!("llm.timeout_secs must be positive"));
    }
    if llm.backend == LlmBackend::Anthropic && llm.api_key_env.trim().is_empty() {
        return Err(anyhow!("llm.api_key_env must name an environment variable"));
    }
    Ok(())
}

fn validate_band(label: &str, band: &Band) -> Result<()> {
    if band.min > band.max {
        return Err(anyhow!("{label}: min {} exceeds max {}", band.min, band.max));
    }
    Ok(())
}

fn validate_text(label: &str, bounds: &TextBounds) -> Result<()> {
    validate_band(&format!("{label}.strict"), &bounds.strict)?;
    validate_band(&format!("{label}.tolerant"), &bounds.tolerant)?;
    if !bounds.strict.within(&bounds.tolerant) {
        return Err(anyhow!(
            "{label}: strict band {} must lie inside tolerant band {}",
            bounds.strict,
            bounds.tolerant
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
