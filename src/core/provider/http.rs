//! Reference OpenAI-compatible HTTP provider service
//!
//! Minimal transport implementation of [`GenerationService`] used by the
//! relay's end-to-end tests and as the template for real provider
//! integrations. Error responses are surfaced as raw shapes for the mapper;
//! nothing is classified here.

use crate::core::error::RawError;
use crate::core::service::{ByteStream, GenerationService};
use crate::core::types::{FinishReason, GenerationRequest, GenerationResponse, Usage};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct HttpServiceConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub api_base: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl HttpServiceConfig {
    /// Config pointing at a base URL with no credentials
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: None,
            timeout_secs: 60,
        }
    }

    /// Attach a bearer token
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// OpenAI-compatible chat service over reqwest
pub struct HttpChatService {
    provider: String,
    config: HttpServiceConfig,
    client: reqwest::Client,
}

impl HttpChatService {
    /// Build a service for `provider` against `config.api_base`
    pub fn new(provider: impl Into<String>, config: HttpServiceConfig) -> Result<Self, RawError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(RawError::from)?;
        Ok(Self {
            provider: provider.into(),
            config,
            client,
        })
    }

    fn request_body(&self, request: &GenerationRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": stream,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    async fn post(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, RawError> {
        let url = format!("{}/chat/completions", self.config.api_base);
        let mut builder = self.client.post(&url).json(&self.request_body(request, stream));
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(RawError::from)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.unwrap_or_default();
        Err(RawError::response(status.as_u16(), headers, body))
    }
}

#[async_trait]
impl GenerationService for HttpChatService {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, RawError> {
        let response = self.post(request, false).await?;
        let body: Value = response.json().await.map_err(RawError::from)?;

        let content = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let finish_reason = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("finish_reason"))
            .and_then(Value::as_str)
            .and_then(FinishReason::parse)
            .unwrap_or(FinishReason::Stop);

        let usage = body
            .get("usage")
            .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());

        let mut result = GenerationResponse::new(request.model.clone(), content);
        if let Some(id) = body.get("id").and_then(Value::as_str) {
            result.id = id.to_string();
        }
        if let Some(model) = body.get("model").and_then(Value::as_str) {
            result.model = model.to_string();
            result.metadata.model_used = model.to_string();
        }
        result.finish_reason = finish_reason;
        result.usage = usage;
        Ok(result)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> Result<ByteStream, RawError> {
        let response = self.post(request, true).await?;
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(RawError::from));
        Ok(Box::pin(stream))
    }
}
