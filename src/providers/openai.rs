//! OpenAI-compatible chat-completions provider.
//!
//! Works against any backend exposing the `/v1/chat/completions` shape
//! (OpenAI, Groq, vLLM, llama.cpp server). The API key is read from the
//! environment by the config layer, never stored in config files.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{GenerateOptions, Provider};
use crate::error::ProviderError;

/// Client for an OpenAI-compatible HTTP endpoint.
pub struct OpenAiProvider {
    name: String,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let model = model.into();
        Self {
            name: format!("openai/{model}"),
            base_url: base_url.into(),
            model,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut builder = self.client.post(&url).timeout(options.timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let started = std::time::Instant::now();
        let response = builder.json(&request).send().await.map_err(|e| {
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

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|_| ProviderError::Malformed {
                provider: self.name.clone(),
                raw: body.clone(),
            })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::Malformed {
                provider: self.name.clone(),
                raw: body,
            })
    }
}
