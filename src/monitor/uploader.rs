use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// One evidence frame as posted to the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceUpload {
    #[serde(rename = "userID")]
    pub user_id: i64,
    /// JPEG data URL
    pub image: String,
    #[serde(rename = "alertType")]
    pub alert_type: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "sequenceIndex")]
    pub sequence_index: u32,
    /// Capture time, epoch milliseconds
    pub timestamp: i64,
}

/// Sink acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub ok: bool,
    #[serde(rename = "alertID")]
    pub alert_id: i64,
    pub saved: String,
}

#[async_trait]
pub trait EvidenceUploader: Send + Sync {
    async fn upload(&self, upload: EvidenceUpload) -> Result<UploadReceipt>;
}

/// Posts evidence as JSON to the sink's HTTP endpoint
pub struct HttpEvidenceUploader {
    client: reqwest::Client,
    url: Url,
}

/// Error body returned by the sink
#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpEvidenceUploader {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("Invalid evidence URL {}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EvidenceUploader for HttpEvidenceUploader {
    async fn upload(&self, upload: EvidenceUpload) -> Result<UploadReceipt> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&upload)
            .send()
            .await
            .map_err(Error::from)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ErrorBody>()
                .await
                .map(|body| body.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(Error::Transport(format!(
                "Evidence {} of session {} rejected ({}): {}",
                upload.sequence_index, upload.session_id, status, detail
            ))
            .into());
        }

        let receipt = response
            .json::<UploadReceipt>()
            .await
            .map_err(|e| Error::Serialization(format!("Malformed evidence receipt: {}", e)))?;
        Ok(receipt)
    }
}
