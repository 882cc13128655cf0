//! Error taxonomy for the enrichment pipeline.
//!
//! Attempt-level failures (`ParseFailure`, `ValidationFailure`, retryable
//! upstream errors) are caught inside the retry loop. Only policy exhaustion,
//! phase-order violations, and fatal upstream errors reach callers.

use crate::record::{EnrichmentPhase, Phase, RecordId};
use crate::validation::Violation;
use thiserror::Error;

/// Errors raised by the LLM API boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// HTTP 429 from the provider.
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// HTTP 5xx from the provider.
    #[error("upstream fault (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// HTTP 401/403, or a missing API key.
    #[error("invalid credentials: {0}")]
    Unauthorized(String),

    /// Any other 4xx.
    #[error("client error (status {status}): {message}")]
    Client { status: u16, message: String },

    /// The outbound call exceeded its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure, or a local command that could not run.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered 2xx but the envelope had no usable text.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    /// Whether another attempt may succeed.
    ///
    /// Only bad credentials are fatal; other 4xx answers retry at the
    /// default backoff and end in the fallback if they persist.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Unauthorized(_))
    }

    /// Classify an HTTP status into the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => LlmError::RateLimited(message),
            401 | 403 => LlmError::Unauthorized(message),
            500..=599 => LlmError::Upstream { status, message },
            _ => LlmError::Client { status, message },
        }
    }
}

/// Core error type for enrichment, repair, and persistence.
#[derive(Error, Debug)]
pub enum EnrichError {
    /// The record is not in a state from which the requested phase may start.
    #[error("record {id} is in state {phase}, which cannot start a phase")]
    IneligibleState { id: RecordId, phase: Phase },

    /// No extraction strategy produced a structured payload.
    #[error("could not extract structured data from response: {0}")]
    ParseFailure(String),

    /// The payload parsed but broke one or more phase rules.
    #[error("validation failed with {} violation(s): {}", .violations.len(), summarize(.violations))]
    ValidationFailure { violations: Vec<Violation> },

    /// The LLM call itself failed.
    #[error("LLM API error: {0}")]
    UpstreamApiError(#[from] LlmError),

    /// Every attempt failed.
    #[error("{phase} gave up after {attempts} attempt(s); last error: {last_error}")]
    RetriesExhausted {
        phase: String,
        attempts: u32,
        last_error: String,
    },

    /// Another worker holds the per-record lock.
    #[error("record {0} is being processed by another worker")]
    RecordBusy(RecordId),

    /// The store's compare-and-set saw a different phase than expected.
    #[error("record {id} changed concurrently: expected {expected}, found {found}")]
    ConcurrentModification {
        id: RecordId,
        expected: Phase,
        found: Phase,
    },

    /// The phase has a payload already; outputs are append-only.
    #[error("record {id} already has a {phase} payload")]
    PayloadExists { id: RecordId, phase: EnrichmentPhase },

    #[error("record {0} not found")]
    NotFound(RecordId),

    /// A repaired field still has the wrong shape.
    #[error("repair of record {id} left misshaped fields: {fields:?}")]
    RepairVerification { id: RecordId, fields: Vec<String> },

    /// No known-good record of the same category exists to anchor a repair.
    #[error("no reference record available for category {0}")]
    NoReference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("record store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Result alias for enrichment operations.
pub type EnrichResult<T> = Result<T, EnrichError>;

impl EnrichError {
    /// Whether the retry loop should keep going after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            EnrichError::ParseFailure(_) | EnrichError::ValidationFailure { .. } => true,
            EnrichError::UpstreamApiError(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Multiplier applied to the default backoff before the next attempt.
    pub fn backoff_multiplier(&self, rate_limit: u32, upstream: u32) -> u32 {
        match self {
            EnrichError::UpstreamApiError(LlmError::RateLimited(_)) => rate_limit,
            EnrichError::UpstreamApiError(LlmError::Upstream { .. }) => upstream,
            _ => 1,
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
