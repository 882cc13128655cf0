//! Multi-phase LLM enrichment for vehicle articles.
//!
//! Records generated upstream move through an editorial phase and a technical
//! phase. Each phase prompts a model, extracts structured data from its free
//! text, validates it against the phase contract, retries with stricter
//! prompts, and falls back to deterministic content when every attempt fails.
//! A separate repair pass fixes base-article fields whose JSON shape drifted
//! from what the renderer expects.

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod history;
pub mod journal;
pub mod llm;
pub mod lm_log;
pub mod orchestrator;
pub mod payload;
pub mod prompt;
pub mod record;
pub mod repair;
pub mod retry;
pub mod status;
pub mod store;
pub mod util;
pub mod validation;
pub mod workflow;

pub use error::{EnrichError, EnrichResult, LlmError};
pub use orchestrator::{AdvanceOutcome, CompletionRun, EnrichmentOrchestrator};
pub use record::{ContentRecord, EnrichmentPhase, Phase, RecordId, VehicleCategory};
pub use repair::{RepairReport, RepairStatus, StructuralRepairService};
