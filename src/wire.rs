//! JSON shapes shared by the generation client and the backend proxy
//!
//! The text endpoint speaks the provider's `contents`/`candidates` layout
//! directly; the image endpoint uses a `instances` request and a reshaped
//! `{imageUrl}` response.

use serde::{Deserialize, Serialize};

/// One piece of a message: text or inline binary data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "inlineData", default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), inline_data: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String,
}

/// A role-tagged message ("user" or "model"); role is absent for system instructions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn with_role(role: &str, text: impl Into<String>) -> Self {
        Self { role: Some(role.to_string()), parts: vec![Part::text(text)] }
    }

    pub fn instruction(text: impl Into<String>) -> Self {
        Self { role: None, parts: vec![Part::text(text)] }
    }

    /// Text of the first part, if any
    pub fn first_text(&self) -> Option<&str> {
        self.parts.first().and_then(|p| p.text.as_deref())
    }
}

/// Body of `POST /api/generate-text`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextGenerationRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "systemInstruction", default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

/// Provider-style `candidates` response, used upstream and towards the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate { content: Some(Content::instruction(text)) }],
        }
    }

    /// `candidates[0].content.parts[0].text`
    pub fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(Content::first_text)
    }

    /// First inline part of the first candidate whose MIME type is an image
    pub fn first_image(&self) -> Option<&InlineData> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.inline_data.as_ref())
                    .find(|data| data.mime_type.starts_with("image/"))
            })
    }
}

/// Body of `POST /api/generate-image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    #[serde(default)]
    pub instances: Vec<ImageInstance>,
    #[serde(default)]
    pub parameters: ImageParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInstance {
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParameters {
    #[serde(rename = "sampleCount")]
    pub sample_count: u32,
}

impl Default for ImageParameters {
    fn default() -> Self {
        Self { sample_count: 1 }
    }
}

impl ImageGenerationRequest {
    pub fn single(prompt: impl Into<String>) -> Self {
        Self {
            instances: vec![ImageInstance { prompt: prompt.into() }],
            parameters: ImageParameters::default(),
        }
    }
}

/// Successful image endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

/// Error body returned by both endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_request_layout() {
        let request = TextGenerationRequest {
            contents: vec![Content::with_role("user", "hello")],
            system_instruction: Some(Content::instruction("be brief")),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hello"}]}],
                "systemInstruction": {"parts": [{"text": "be brief"}]}
            })
        );
    }

    #[test]
    fn test_first_image_skips_text_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [
                {"text": "here you go"},
                {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}}
            ]}}]
        }))
        .unwrap();

        let image = response.first_image().unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(response.first_text(), Some("here you go"));
    }

    #[test]
    fn test_image_request_layout() {
        let value = serde_json::to_value(ImageGenerationRequest::single("a red fox")).unwrap();
        assert_eq!(
            value,
            json!({"instances": [{"prompt": "a red fox"}], "parameters": {"sampleCount": 1}})
        );
    }
}
