//! Per-phase wiring: which prompt, rules, recovery, fallback, and output
//! slot belong to each payload type.

use crate::error::EnrichResult;
use crate::extract::FieldRecovery;
use crate::fallback::FallbackSynthesizer;
use crate::payload::{EditorialPayload, PhaseOutput, PhasePayload, TechnicalPayload};
use crate::prompt::PromptBuilder;
use crate::record::{ContentRecord, PhaseOutputs, VehicleIdentity};
use crate::retry::AttemptContext;
use crate::validation::{EditorialRules, TechnicalRules, ValidationReport};

/// Both phases' rules, built once from config.
#[derive(Debug, Clone)]
pub struct PhaseRules {
    pub editorial: EditorialRules,
    pub technical: TechnicalRules,
}

pub trait PhaseContract: PhasePayload {
    fn prompt(builder: &PromptBuilder, record: &ContentRecord, ctx: &AttemptContext) -> String;
    fn validate(rules: &PhaseRules, payload: &Self, attempt: u32) -> ValidationReport;
    fn recovery() -> FieldRecovery;
    fn fallback(synth: &FallbackSynthesizer, vehicle: &VehicleIdentity) -> EnrichResult<Self>;
    fn output(outputs: &PhaseOutputs) -> Option<&PhaseOutput<Self>>;
    fn set_output(outputs: &mut PhaseOutputs, output: PhaseOutput<Self>);
}

impl PhaseContract for EditorialPayload {
    fn prompt(builder: &PromptBuilder, record: &ContentRecord, ctx: &AttemptContext) -> String {
        builder.editorial(record, ctx)
    }

    fn validate(rules: &PhaseRules, payload: &Self, attempt: u32) -> ValidationReport {
        rules.editorial.validate(payload, attempt)
    }

    fn recovery() -> FieldRecovery {
        FieldRecovery::editorial()
    }

    fn fallback(synth: &FallbackSynthesizer, vehicle: &VehicleIdentity) -> EnrichResult<Self> {
        synth.editorial(vehicle)
    }

    fn output(outputs: &PhaseOutputs) -> Option<&PhaseOutput<Self>> {
        outputs.editorial.as_ref()
    }

    fn set_output(outputs: &mut PhaseOutputs, output: PhaseOutput<Self>) {
        outputs.editorial = Some(output);
    }
}

impl PhaseContract for TechnicalPayload {
    fn prompt(builder: &PromptBuilder, record: &ContentRecord, ctx: &AttemptContext) -> String {
        builder.technical(record, ctx)
    }

    fn validate(rules: &PhaseRules, payload: &Self, attempt: u32) -> ValidationReport {
        rules.technical.validate(payload, attempt)
    }

    fn recovery() -> FieldRecovery {
        FieldRecovery::technical()
    }

    fn fallback(synth: &FallbackSynthesizer, vehicle: &VehicleIdentity) -> EnrichResult<Self> {
        synth.technical(vehicle)
    }

    fn output(outputs: &PhaseOutputs) -> Option<&PhaseOutput<Self>> {
        outputs.technical.as_ref()
    }

    fn set_output(outputs: &mut PhaseOutputs, output: PhaseOutput<Self>) {
        outputs.technical = Some(output);
    }
}
