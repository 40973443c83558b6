//! Provider abstraction over interchangeable LLM backends.
//!
//! Concrete providers implement the `Provider` trait; the `ProviderPool`
//! owns health tracking, rate-limit counters, retry, and the fallback chain
//! so the orchestrator never talks to a backend directly.

pub mod ollama;
pub mod openai;
pub mod pool;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use pool::{ProviderPool, RetryPolicy};

/// Options for a single generation request.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Hard deadline for the HTTP round trip
    pub timeout: Duration,

    /// Sampling temperature; extraction wants it low
    pub temperature: f32,

    /// Upper bound on generated tokens, when the backend supports it
    pub max_tokens: Option<u32>,

    /// Request strict JSON output from the backend
    pub json: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            temperature: 0.1,
            max_tokens: Some(1024),
            json: true,
        }
    }
}

/// Health of a provider as observed by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHealth {
    /// Recent requests succeeded
    Healthy,
    /// At least one recent rate-limit or availability fault
    Degraded,
    /// Repeated faults; skipped until the cooldown elapses
    Down,
}

/// Point-in-time snapshot of one provider, for monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider_name: String,
    pub health: ProviderHealth,
    /// Requests issued in the current rolling window
    pub requests_in_window: u64,
    /// Requests issued over the pool's lifetime
    pub total_requests: u64,
    /// Quota left in the current window, if a quota is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_quota: Option<u64>,
}

/// A text-generation backend.
///
/// Implementations are plain HTTP clients; they report faults through the
/// `ProviderError` taxonomy and leave retry/fallback decisions to the pool.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name used in status output and logs.
    fn name(&self) -> &str;

    /// Generate a completion for the prompt.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ProviderError>;
}
