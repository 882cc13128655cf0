//! Content records and the phase state machine.
//!
//! A record is created in `base-generated` by an upstream generator and moves
//! through the enrichment phases in a fixed order. Only the orchestrator
//! mutates `phase`.

use crate::payload::{EditorialPayload, PhaseOutput, TechnicalPayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Opaque record identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    BaseGenerated,
    EditorialProcessing,
    EditorialCompleted,
    TechnicalProcessing,
    Completed,
    Failed,
}

impl Phase {
    /// Every state, in lifecycle order.
    pub const ALL: [Phase; 6] = [
        Phase::BaseGenerated,
        Phase::EditorialProcessing,
        Phase::EditorialCompleted,
        Phase::TechnicalProcessing,
        Phase::Completed,
        Phase::Failed,
    ];

    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BaseGenerated => "base-generated",
            Phase::EditorialProcessing => "editorial-processing",
            Phase::EditorialCompleted => "editorial-completed",
            Phase::TechnicalProcessing => "technical-processing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }

    /// The enrichment phase that may start from this state, if any.
    pub fn next_enrichment(&self) -> Option<EnrichmentPhase> {
        match self {
            Phase::BaseGenerated => Some(EnrichmentPhase::Editorial),
            Phase::EditorialCompleted => Some(EnrichmentPhase::Technical),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            Phase::EditorialProcessing | Phase::TechnicalProcessing
        )
    }

    /// Position in the forward order; `Failed` has none.
    pub fn ordinal(&self) -> Option<u8> {
        match self {
            Phase::BaseGenerated => Some(0),
            Phase::EditorialProcessing => Some(1),
            Phase::EditorialCompleted => Some(2),
            Phase::TechnicalProcessing => Some(3),
            Phase::Completed => Some(4),
            Phase::Failed => None,
        }
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Forward edges advance by exactly one; `failed` is reachable from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Phase::Failed {
            return true;
        }
        match (self.ordinal(), next.ordinal()) {
            (Some(from), Some(to)) => to == from + 1,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The LLM-backed enrichment stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentPhase {
    Editorial,
    Technical,
}

impl EnrichmentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentPhase::Editorial => "editorial",
            EnrichmentPhase::Technical => "technical",
        }
    }

    /// State required before this phase may start.
    pub fn eligible_from(&self) -> Phase {
        match self {
            EnrichmentPhase::Editorial => Phase::BaseGenerated,
            EnrichmentPhase::Technical => Phase::EditorialCompleted,
        }
    }

    pub fn processing_state(&self) -> Phase {
        match self {
            EnrichmentPhase::Editorial => Phase::EditorialProcessing,
            EnrichmentPhase::Technical => Phase::TechnicalProcessing,
        }
    }

    pub fn completed_state(&self) -> Phase {
        match self {
            EnrichmentPhase::Editorial => Phase::EditorialCompleted,
            EnrichmentPhase::Technical => Phase::Completed,
        }
    }
}

impl fmt::Display for EnrichmentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vehicle category tag carried by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleCategory {
    Car,
    CarElectric,
    CarHybrid,
    Motorcycle,
    MotorcycleScooter,
    MotorcycleStreet,
    MotorcycleSport,
    MotorcycleTrail,
    Pickup,
    Truck,
}

impl VehicleCategory {
    pub const ALL: [VehicleCategory; 10] = [
        VehicleCategory::Car,
        VehicleCategory::CarElectric,
        VehicleCategory::CarHybrid,
        VehicleCategory::Motorcycle,
        VehicleCategory::MotorcycleScooter,
        VehicleCategory::MotorcycleStreet,
        VehicleCategory::MotorcycleSport,
        VehicleCategory::MotorcycleTrail,
        VehicleCategory::Pickup,
        VehicleCategory::Truck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "car",
            VehicleCategory::CarElectric => "car_electric",
            VehicleCategory::CarHybrid => "car_hybrid",
            VehicleCategory::Motorcycle => "motorcycle",
            VehicleCategory::MotorcycleScooter => "motorcycle_scooter",
            VehicleCategory::MotorcycleStreet => "motorcycle_street",
            VehicleCategory::MotorcycleSport => "motorcycle_sport",
            VehicleCategory::MotorcycleTrail => "motorcycle_trail",
            VehicleCategory::Pickup => "pickup",
            VehicleCategory::Truck => "truck",
        }
    }

    pub fn is_motorcycle(&self) -> bool {
        matches!(
            self,
            VehicleCategory::Motorcycle
                | VehicleCategory::MotorcycleScooter
                | VehicleCategory::MotorcycleStreet
                | VehicleCategory::MotorcycleSport
                | VehicleCategory::MotorcycleTrail
        )
    }

    /// Portuguese label used in prompts and fallback text.
    pub fn label(&self) -> &'static str {
        match self {
            VehicleCategory::Car => "carro",
            VehicleCategory::CarElectric => "carro elétrico",
            VehicleCategory::CarHybrid => "carro híbrido",
            VehicleCategory::Motorcycle => "motocicleta",
            VehicleCategory::MotorcycleScooter => "scooter",
            VehicleCategory::MotorcycleStreet => "motocicleta street",
            VehicleCategory::MotorcycleSport => "motocicleta esportiva",
            VehicleCategory::MotorcycleTrail => "motocicleta trail",
            VehicleCategory::Pickup => "picape",
            VehicleCategory::Truck => "caminhão",
        }
    }
}

impl fmt::Display for VehicleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vehicle identity attributes used for prompts and fallback text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleIdentity {
    pub make: String,
    pub model: String,
    pub year: u16,
    pub category: VehicleCategory,
}

impl VehicleIdentity {
    /// "Make Model Year", as shown to readers.
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.make, self.model, self.year)
    }
}

/// Append-only phase payload slots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial: Option<PhaseOutput<EditorialPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical: Option<PhaseOutput<TechnicalPayload>>,
}

impl PhaseOutputs {
    pub fn has(&self, phase: EnrichmentPhase) -> bool {
        match phase {
            EnrichmentPhase::Editorial => self.editorial.is_some(),
            EnrichmentPhase::Technical => self.technical.is_some(),
        }
    }
}

/// The unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: RecordId,
    pub vehicle: VehicleIdentity,
    pub phase: Phase,
    /// Section name -> section content, produced upstream.
    #[serde(default)]
    pub base_article: Map<String, Value>,
    #[serde(default)]
    pub phase_outputs: PhaseOutputs,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at_ms: Option<u64>,
    /// Phase that was running when the record failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<EnrichmentPhase>,
}

impl ContentRecord {
    /// Build a freshly generated record in `base-generated`.
    pub fn new(id: RecordId, vehicle: VehicleIdentity, base_article: Map<String, Value>) -> Self {
        Self {
            id,
            vehicle,
            phase: Phase::BaseGenerated,
            base_article,
            phase_outputs: PhaseOutputs::default(),
            attempt_count: 0,
            last_error: None,
            processing_started_at_ms: None,
            failed_at_ms: None,
            failed_phase: None,
        }
    }

    /// The state a failed or stranded record returns to on reset.
    ///
    /// Derived from the persisted outputs so the ordering invariant holds.
    pub fn resume_state(&self) -> Phase {
        if self.phase_outputs.technical.is_some() {
            Phase::Completed
        } else if self.phase_outputs.editorial.is_some() {
            Phase::EditorialCompleted
        } else {
            Phase::BaseGenerated
        }
    }
}
