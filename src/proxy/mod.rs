//! Backend proxy
//!
//! Holds the provider API key and exposes the two endpoints the assistant
//! talks to. Text requests are forwarded in the provider's own layout;
//! image responses are reshaped into a single `imageUrl` data URL.

pub mod gemini;
pub mod rate_limit;

use crate::error::{IntoLizError, LizError};
use crate::wire::{Content, ErrorBody, GenerateContentResponse, ImageGenerationResponse};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use gemini::ContentProvider;
use rate_limit::SharedLimiter;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Largest accepted JSON body
pub const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

const EMPTY_TEXT_REPLY: &str = "No response generated.";

#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    pub port: u16,
    pub rate_limit_window: Duration,
    pub rate_limit_max: u32,
    pub cors_origin: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 60,
            cors_origin: "*".to_string(),
        }
    }
}

pub struct ProxyState {
    provider: Arc<dyn ContentProvider>,
}

fn error_response(status: StatusCode, error: &str, details: Option<String>) -> Response {
    (status, Json(ErrorBody { error: error.to_string(), details })).into_response()
}

fn cors_layer(origin: &str) -> Result<CorsLayer, LizError> {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(origin.trim())
            .map_liz_err(|e| LizError::Config(format!("Invalid CORS origin '{}': {}", origin, e)))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new().allow_origin(allow_origin).allow_methods(Any).allow_headers(Any))
}

/// Build the proxy router
///
/// Rate limiting keys on the peer address, so serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(
    provider: Arc<dyn ContentProvider>,
    limiter: SharedLimiter,
    cors_origin: &str,
) -> Result<Router, LizError> {
    let state = Arc::new(ProxyState { provider });

    Ok(Router::new()
        .route("/api/generate-text", post(generate_text))
        .route("/api/generate-image", post(generate_image))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(middleware::from_fn_with_state(limiter, rate_limit::rate_limit_middleware))
        .layer(cors_layer(cors_origin)?))
}

async fn generate_text(
    State(state): State<Arc<ProxyState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return error_response(rejection.status(), &rejection.body_text(), None),
    };

    let contents = match body
        .get("contents")
        .filter(|c| c.is_array())
        .and_then(|c| serde_json::from_value::<Vec<Content>>(c.clone()).ok())
    {
        Some(contents) => contents,
        None => return error_response(StatusCode::BAD_REQUEST, "Invalid contents format.", None),
    };

    let system_text = body
        .pointer("/systemInstruction/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default();

    match state.provider.generate_text(contents, system_text).await {
        Ok(response) => {
            let text = response
                .first_text()
                .filter(|t| !t.is_empty())
                .unwrap_or(EMPTY_TEXT_REPLY);
            Json(GenerateContentResponse::from_text(text)).into_response()
        }
        Err(e) => {
            log::error!("Text generation failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "LLM processing failed.",
                Some(e.to_string()),
            )
        }
    }
}

async fn generate_image(
    State(state): State<Arc<ProxyState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return error_response(rejection.status(), &rejection.body_text(), None),
    };

    let prompt = match body
        .pointer("/instances/0/prompt")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        Some(prompt) => prompt.to_string(),
        None => return error_response(StatusCode::BAD_REQUEST, "Invalid prompt.", None),
    };

    match state.provider.generate_image(&prompt).await {
        Ok(response) => match response.first_image() {
            Some(image) => Json(ImageGenerationResponse {
                image_url: format!("data:{};base64,{}", image.mime_type, image.data),
            })
            .into_response(),
            None => {
                log::error!("Image model returned no inline image");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Model returned no image data.",
                    None,
                )
            }
        },
        Err(e) => {
            log::error!("Image generation failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Image generation failed.",
                Some(e.to_string()),
            )
        }
    }
}

/// Bind and serve until the process is stopped
pub async fn serve(provider: Arc<dyn ContentProvider>, config: ProxyConfig) -> Result<(), LizError> {
    let limiter = rate_limit::create_limiter(config.rate_limit_max, config.rate_limit_window);
    let app = router(provider, limiter.clone(), &config.cors_origin)?;

    // Forget idle clients once per window
    let window = config.rate_limit_window.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        loop {
            ticker.tick().await;
            limiter.retain_recent();
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_liz_err(|e| LizError::Config(format!("Failed to bind proxy on {}: {}", addr, e)))?;

    log::info!("Proxy listening on http://{}", addr);
    log::info!(
        "  Rate limit: {} requests per {}s per client",
        config.rate_limit_max,
        config.rate_limit_window.as_secs()
    );
    log::info!("  CORS origin: {}", config.cors_origin);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_liz_err(|e| LizError::Remote(format!("Proxy server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_origin_validation() {
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("https://hub.example.com").is_ok());
        assert!(cors_layer("bad\norigin").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.rate_limit_max, 60);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.cors_origin, "*");
    }
}
