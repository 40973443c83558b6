//! Pipeline configuration.
//!
//! One YAML file composes the knobs of every component; each section has
//! serde defaults so an empty file is a working (Ollama-only) setup. API
//! keys are never stored in the file; providers name an environment
//! variable to read at build time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ontology::NormalizerConfig;
use crate::pipeline::OrchestratorConfig;
use crate::providers::{OllamaProvider, OpenAiProvider, Provider, ProviderPool, RetryPolicy};
use crate::segmenter::SegmenterConfig;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Providers in fallback order; first entry is primary
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub segmenter: SegmenterConfig,

    #[serde(default)]
    pub normalizer: NormalizerConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub ontologies: OntologyPaths,
}

/// Vocabulary file locations; absent paths degrade normalization to
/// `match_method = none`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OntologyPaths {
    /// JSON array of HPO terms
    pub phenotype: Option<PathBuf>,

    /// JSON array of gene symbol terms
    pub gene: Option<PathBuf>,
}

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

/// One provider entry in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Base URL of the backend
    pub base_url: String,

    /// Model name to request
    pub model: String,

    /// Environment variable holding the API key, if the backend needs one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Local per-minute request quota; unset means unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u64>,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        kind: ProviderKind::Ollama,
        base_url: "http://localhost:11434".to_string(),
        model: "llama3".to_string(),
        api_key_env: None,
        requests_per_minute: None,
    }]
}

impl ProviderConfig {
    /// Construct the HTTP client for this entry.
    pub fn build(&self) -> Result<Arc<dyn Provider>> {
        match self.kind {
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(
                self.base_url.clone(),
                self.model.clone(),
            ))),
            ProviderKind::OpenAi => {
                let api_key = match &self.api_key_env {
                    Some(var) => Some(std::env::var(var).with_context(|| {
                        format!("api_key_env '{var}' is set in config but not in the environment")
                    })?),
                    None => None,
                };
                Ok(Arc::new(OpenAiProvider::new(
                    self.base_url.clone(),
                    self.model.clone(),
                    api_key,
                )))
            }
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("failed to parse config YAML")
    }

    /// Build the provider pool in configured fallback order.
    pub fn build_pool(&self) -> Result<ProviderPool> {
        let mut pool = ProviderPool::new(self.retry.clone());
        for provider in &self.providers {
            pool.add_provider(provider.build()?, provider.requests_per_minute);
        }
        Ok(pool)
    }
}
