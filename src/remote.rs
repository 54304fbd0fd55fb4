use crate::database::{Sender, Turn};
use crate::error::LizError;
use crate::wire::{
    Content, GenerateContentResponse, ImageGenerationRequest, ImageGenerationResponse,
    TextGenerationRequest,
};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Serialize;

const DEFAULT_TIMEOUT_SECS: u64 = 120; // image generation can take a while

/// Number of prior turns sent with each text request
pub const CONTEXT_WINDOW: usize = 5;

/// Displayed when the proxy is unreachable or answers with an error status
pub const NETWORK_SENTINEL: &str = "Network or Server Error: Check console for details.";

/// Displayed when the proxy answers but carries no usable content
pub const CORRUPTION_SENTINEL: &str = "Data corruption detected.";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Liz, the admin assistant of JOINT HUB. \
You are intelligent, helpful and lively, and you manage this system. \
Short answers preferred. Stay polite and happy unless a user is rude to you first.";

/// Why a generation call produced nothing displayable
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("empty response")]
    EmptyResponse,
}

impl GenerationError {
    /// Stable human-readable text the UI can always display
    pub fn sentinel(&self) -> &'static str {
        match self {
            GenerationError::NetworkFailure(_) | GenerationError::ServerError { .. } => {
                NETWORK_SENTINEL
            }
            GenerationError::EmptyResponse => CORRUPTION_SENTINEL,
        }
    }
}

/// A generated image, kept as base64 with its MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: String,
}

impl ImagePayload {
    /// Parse a `data:image/<mime>;base64,<data>` URL
    ///
    /// Returns `None` for non-image MIME types or undecodable payloads.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (mime_type, data) = rest.split_once(";base64,")?;
        if !mime_type.starts_with("image/") || data.is_empty() {
            return None;
        }
        base64::engine::general_purpose::STANDARD.decode(data).ok()?;

        Some(Self { mime_type: mime_type.to_string(), data: data.to_string() })
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Text and image generation as seen by the conversation controller
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a reply to `prompt` given the trailing conversation window
    async fn generate_text(&self, prompt: &str, context: &[Turn]) -> Result<String, GenerationError>;

    async fn generate_image(&self, prompt: &str) -> Result<ImagePayload, GenerationError>;
}

/// HTTP client for the backend proxy's generation endpoints
pub struct RemoteClient {
    client: Client,
    text_endpoint: String,
    image_endpoint: String,
    system_instruction: String,
}

impl RemoteClient {
    /// Create a client for the given proxy endpoints
    ///
    /// Both endpoints must be absolute http(s) URLs.
    pub fn new(
        text_endpoint: String,
        image_endpoint: String,
        system_instruction: Option<String>,
    ) -> Result<Self, LizError> {
        for endpoint in [&text_endpoint, &image_endpoint] {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(LizError::Config(format!(
                    "Invalid endpoint: '{}'. Must start with http:// or https://",
                    endpoint
                )));
            }
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        log::info!("Remote generation client ready");
        log::info!("  Text endpoint: {}", text_endpoint);
        log::info!("  Image endpoint: {}", image_endpoint);

        Ok(Self {
            client,
            text_endpoint,
            image_endpoint,
            system_instruction: system_instruction
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        })
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<serde_json::Value, GenerationError> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                log::error!("API call failed for {}: {}", endpoint, e);
                GenerationError::NetworkFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            log::error!("API call to {} returned {}: {}", endpoint, status, body);
            return Err(GenerationError::ServerError { status: status.as_u16(), body });
        }

        response.json().await.map_err(|e| {
            log::error!("Malformed response from {}: {}", endpoint, e);
            GenerationError::ServerError {
                status: status.as_u16(),
                body: format!("malformed response: {}", e),
            }
        })
    }
}

/// Build the text request: mapped context followed by the new prompt
pub fn build_text_request(prompt: &str, context: &[Turn], system_instruction: &str) -> TextGenerationRequest {
    let mut contents: Vec<Content> = context
        .iter()
        .filter(|turn| matches!(turn.sender, Sender::User | Sender::Assistant))
        .map(|turn| {
            let role = if turn.sender == Sender::User { "user" } else { "model" };
            Content::with_role(role, turn.text.clone())
        })
        .collect();
    contents.push(Content::with_role("user", prompt));

    TextGenerationRequest {
        contents,
        system_instruction: Some(Content::instruction(system_instruction)),
    }
}

#[async_trait]
impl GenerationBackend for RemoteClient {
    async fn generate_text(&self, prompt: &str, context: &[Turn]) -> Result<String, GenerationError> {
        log::info!("Generating text for prompt: '{}' ({} context turns)", prompt, context.len());

        let request = build_text_request(prompt, context, &self.system_instruction);
        let value = self.post_json(&self.text_endpoint, &request).await?;

        let response: GenerateContentResponse =
            serde_json::from_value(value).map_err(|_| GenerationError::EmptyResponse)?;

        match response.first_text().map(str::trim) {
            Some(text) if !text.is_empty() => {
                log::info!("Response received: {} characters", text.len());
                Ok(text.to_string())
            }
            _ => {
                log::warn!("Text endpoint returned no candidates");
                Err(GenerationError::EmptyResponse)
            }
        }
    }

    async fn generate_image(&self, prompt: &str) -> Result<ImagePayload, GenerationError> {
        log::info!("Generating image for prompt: '{}'", prompt);

        let value = self
            .post_json(&self.image_endpoint, &ImageGenerationRequest::single(prompt))
            .await?;

        let response: ImageGenerationResponse =
            serde_json::from_value(value).map_err(|_| GenerationError::EmptyResponse)?;

        ImagePayload::from_data_url(&response.image_url).ok_or_else(|| {
            log::warn!("Image endpoint returned an unusable data URL");
            GenerationError::EmptyResponse
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RemoteClient::new(
            "http://localhost:3000/api/generate-text".to_string(),
            "http://localhost:3000/api/generate-image".to_string(),
            None,
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let client = RemoteClient::new(
            "localhost:3000/api/generate-text".to_string(),
            "http://localhost:3000/api/generate-image".to_string(),
            None,
        );
        assert!(client.is_err());
    }

    #[test]
    fn test_context_roles_and_prompt_order() {
        let context = vec![Turn::user("hi"), Turn::assistant("hello!")];
        let request = build_text_request("how are you?", &context, "be brief");

        let roles: Vec<_> = request.contents.iter().map(|c| c.role.clone().unwrap()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(request.contents[2].first_text(), Some("how are you?"));
        assert_eq!(
            request.system_instruction.as_ref().and_then(Content::first_text),
            Some("be brief")
        );
    }

    #[test]
    fn test_system_turns_never_reach_the_model() {
        let context = vec![Turn::system("History loaded successfully."), Turn::user("hi")];
        let request = build_text_request("again", &context, "x");
        assert_eq!(request.contents.len(), 2);
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(
            GenerationError::NetworkFailure("refused".into()).sentinel(),
            NETWORK_SENTINEL
        );
        assert_eq!(
            GenerationError::ServerError { status: 500, body: String::new() }.sentinel(),
            NETWORK_SENTINEL
        );
        assert_eq!(GenerationError::EmptyResponse.sentinel(), CORRUPTION_SENTINEL);
    }

    #[test]
    fn test_data_url_parsing() {
        let payload = ImagePayload::from_data_url("data:image/jpeg;base64,/9j/4AAQ").unwrap();
        assert_eq!(payload.mime_type, "image/jpeg");
        assert_eq!(payload.to_data_url(), "data:image/jpeg;base64,/9j/4AAQ");

        assert!(ImagePayload::from_data_url("data:text/plain;base64,aGk=").is_none());
        assert!(ImagePayload::from_data_url("data:image/png;base64,").is_none());
        assert!(ImagePayload::from_data_url("data:image/png;base64,@@@").is_none());
        assert!(ImagePayload::from_data_url("https://example.com/fox.png").is_none());
    }
}
