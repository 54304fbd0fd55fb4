//! Upstream content provider
//!
//! `ContentProvider` is the seam between the proxy handlers and the LLM
//! vendor; `GeminiClient` is the production implementation over the
//! Generative Language REST API.

use crate::error::LizError;
use crate::wire::{Content, GenerateContentResponse, Part};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub const TEXT_MODEL: &str = "gemini-2.5-flash";
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TEXT_TEMPERATURE: f32 = 0.7;
const TEXT_TOP_P: f32 = 0.9;
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// `models/{model}:generateContent` request body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
}

impl GenerateContentRequest {
    /// Chat request; an empty system text is left out
    pub fn text(contents: Vec<Content>, system_text: &str) -> Self {
        Self {
            contents,
            system_instruction: (!system_text.is_empty()).then(|| Content::instruction(system_text)),
            generation_config: Some(GenerationConfig {
                temperature: Some(TEXT_TEMPERATURE),
                top_p: Some(TEXT_TOP_P),
                response_modalities: None,
            }),
        }
    }

    pub fn image(prompt: &str) -> Self {
        Self {
            contents: vec![Content { role: Some("user".to_string()), parts: vec![Part::text(prompt)] }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
                ..Default::default()
            }),
        }
    }
}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn generate_text(
        &self,
        contents: Vec<Content>,
        system_text: &str,
    ) -> Result<GenerateContentResponse, ProxyError>;

    async fn generate_image(&self, prompt: &str) -> Result<GenerateContentResponse, ProxyError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, LizError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, LizError> {
        if api_key.trim().is_empty() {
            return Err(LizError::Config("Provider API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { client, api_key, base_url: base_url.trim_end_matches('/').to_string() })
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProxyError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| ProxyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::Provider { status: status.as_u16(), body });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| ProxyError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ContentProvider for GeminiClient {
    async fn generate_text(
        &self,
        contents: Vec<Content>,
        system_text: &str,
    ) -> Result<GenerateContentResponse, ProxyError> {
        log::info!("Forwarding {} content(s) to {}", contents.len(), TEXT_MODEL);
        self.generate(TEXT_MODEL, &GenerateContentRequest::text(contents, system_text))
            .await
    }

    async fn generate_image(&self, prompt: &str) -> Result<GenerateContentResponse, ProxyError> {
        log::info!("Forwarding image prompt to {}", IMAGE_MODEL);
        self.generate(IMAGE_MODEL, &GenerateContentRequest::image(prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request_carries_sampling_config() {
        let request = GenerateContentRequest::text(vec![Content::with_role("user", "hi")], "be brief");

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "systemInstruction": {"parts": [{"text": "be brief"}]},
                "generationConfig": {"temperature": 0.7, "topP": 0.9}
            })
        );
    }

    #[test]
    fn test_empty_system_text_is_omitted() {
        let request = GenerateContentRequest::text(vec![], "");
        assert!(request.system_instruction.is_none());
    }

    #[test]
    fn test_image_request_asks_for_image_output() {
        let value = serde_json::to_value(GenerateContentRequest::image("a red fox")).unwrap();
        assert_eq!(value["generationConfig"]["responseModalities"], json!(["TEXT", "IMAGE"]));
        assert_eq!(value["contents"][0]["parts"][0]["text"], "a red fox");
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(GeminiClient::new("  ".to_string()).is_err());
    }
}
