//! Error taxonomy for providers and the extraction pipeline.
//!
//! Provider faults are classified by how the pool should react: only
//! timeouts are worth retrying on the same provider, and only faults that
//! say something about the backend's state degrade its health. Everything
//! else falls back down the provider chain. Pipeline errors are rare by
//! design; extraction degrades to missing fields instead of failing.

use thiserror::Error;
use uuid::Uuid;

/// A fault from one LLM backend.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The backend rejected the request for quota reasons (HTTP 429 or a
    /// local rate window).
    #[error("provider '{provider}' rate limited")]
    RateLimited { provider: String },

    /// The backend could not be reached or answered with a server error.
    #[error("provider '{provider}' unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    /// The request exceeded its deadline.
    #[error("provider '{provider}' timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },

    /// The backend answered, but not with parseable structured output.
    #[error("provider '{provider}' returned a malformed response")]
    Malformed { provider: String, raw: String },
}

impl ProviderError {
    /// Name of the provider that produced the fault.
    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimited { provider }
            | Self::Unavailable { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Malformed { provider, .. } => provider,
        }
    }

    /// Whether the same provider is worth another attempt for this request.
    ///
    /// Rate limits and outages will not clear within a retry budget, and a
    /// malformed response from the same prompt tends to repeat.
    pub fn retry_same_provider(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this fault should count against the provider's health.
    pub fn degrades_health(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }
}

/// A hard failure of the extraction pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document has no readable text to segment.
    #[error("document {0} contains no readable text")]
    EmptyDocument(Uuid),

    /// A configured ontology vocabulary could not be loaded.
    #[error("failed to load ontology '{name}': {reason}")]
    OntologyLoad { name: String, reason: String },
}
