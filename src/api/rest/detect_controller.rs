use crate::api::rest::{ApiError, ApiResult, AppState};
use crate::config::ApiConfig;
use crate::error::Error;
use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Body of `POST /api/detect_frame`
#[derive(Debug, Default, Deserialize)]
pub struct DetectFrameRequest {
    pub image: Option<String>,
}

#[derive(Serialize)]
struct ForwardedFrame<'a> {
    image: &'a str,
}

/// Relays single frames to the AI detection service for browser clients
/// that cannot reach it directly.
pub struct DetectProxy {
    client: reqwest::Client,
    url: Url,
}

impl DetectProxy {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("Invalid AI service URL {}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Self::new(&config.ai_service_url, config.ai_timeout())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Forward one frame and return the service's JSON verbatim
    pub async fn forward(&self, image: &str) -> ApiResult<Value> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&ForwardedFrame { image })
            .send()
            .await
            .map_err(unreachable_service)?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<Value> = response.json().await.ok();
            let message = body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("AI Service failure.");
            error!("AI service answered {}: {}", status, message);
            return Err(ApiError {
                message: message.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(unreachable_service)?;
        match serde_json::from_slice::<Value>(&body) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Ok(value),
            other => {
                debug!("Unusable AI service body: {:?}", other);
                Err(ApiError {
                    message: "Invalid response from AI Service.".to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                })
            }
        }
    }
}

fn unreachable_service(e: reqwest::Error) -> ApiError {
    error!("Error communicating with AI service: {}", e);
    let (status, message) = if e.is_timeout() {
        (StatusCode::GATEWAY_TIMEOUT, "AI Service Timeout.")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Failed to connect to AI Detection Server.")
    };
    ApiError {
        message: message.to_string(),
        status: status.as_u16(),
    }
}

/// `POST /api/detect_frame`
pub async fn detect_frame(
    State(state): State<AppState>,
    Json(request): Json<DetectFrameRequest>,
) -> ApiResult<Json<Value>> {
    let Some(image) = request.image.filter(|image| !image.is_empty()) else {
        return Err(ApiError {
            message: "Missing image data.".to_string(),
            status: StatusCode::BAD_REQUEST.as_u16(),
        });
    };

    Ok(Json(state.detect.forward(&image).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_a_malformed_service_url() {
        let err = DetectProxy::new("not a url", Duration::from_secs(2)).err().unwrap();
        assert!(matches!(crate::error::as_error(&err), Some(Error::Config(_))));
    }

    #[test]
    fn builds_from_default_config() {
        let proxy = DetectProxy::from_config(&ApiConfig::default()).unwrap();
        assert_eq!(proxy.url().as_str(), "http://localhost:5000/api/detect_frame");
    }
}
