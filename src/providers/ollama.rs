//! Ollama provider for local models.
//!
//! Talks to the `/api/generate` endpoint with `stream: false` and asks for
//! JSON-formatted output when the caller wants structured responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerateOptions, Provider};
use crate::error::ProviderError;

/// Client for a local Ollama server.
pub struct OllamaProvider {
    name: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            name: format!("ollama/{model}"),
            base_url: base_url.into(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new("http://localhost:11434", "llama3")
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: options.json.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        provider: self.name.clone(),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    ProviderError::Unavailable {
                        provider: self.name.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                provider: self.name.clone(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable {
                provider: self.name.clone(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = response.text().await.map_err(|e| ProviderError::Unavailable {
            provider: self.name.clone(),
            reason: e.to_string(),
        })?;

        let parsed: OllamaResponse =
            serde_json::from_str(&body).map_err(|_| ProviderError::Malformed {
                provider: self.name.clone(),
                raw: body.clone(),
            })?;

        Ok(parsed.response)
    }
}
