#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response};
use axum::Router;
use image::{Rgb, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use guardcam::api::rest::{self, AppState, DetectProxy};
use guardcam::config::SecurityConfig;
use guardcam::db::repositories::{AlertStore, MemoryAlertStore};
use guardcam::monitor::uploader::{EvidenceUpload, EvidenceUploader, UploadReceipt};
use guardcam::monitor::Frame;
use guardcam::security::SecurityService;
use guardcam::services::{AlertHistory, EvidenceFiles, EvidenceSink, EvidenceUploadRequest, LooseId};

/// Server-side components backed by an in-memory store and a temp directory
pub struct TestServer {
    pub store: Arc<MemoryAlertStore>,
    pub files: EvidenceFiles,
    pub sink: Arc<EvidenceSink>,
    pub history: Arc<AlertHistory>,
    pub security: Arc<SecurityService>,
    _dir: TempDir,
}

impl TestServer {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryAlertStore::new());
        let files = EvidenceFiles::new(dir.path(), "uploads");
        let dyn_store: Arc<dyn AlertStore> = store.clone();

        Self {
            sink: Arc::new(EvidenceSink::new(dyn_store.clone(), files.clone())),
            history: Arc::new(AlertHistory::new(dyn_store, files.clone())),
            security: Arc::new(SecurityService::new(SecurityConfig::default())),
            store,
            files,
            _dir: dir,
        }
    }

    /// Build the full application router, as `main.rs` does
    pub fn router(&self) -> Router {
        self.router_with_ai("http://127.0.0.1:5000/api/detect_frame", Duration::from_secs(2))
    }

    /// Router whose detection relay targets `ai_url`
    pub fn router_with_ai(&self, ai_url: &str, timeout: Duration) -> Router {
        let state = AppState {
            sink: self.sink.clone(),
            history: self.history.clone(),
            security: self.security.clone(),
            detect: Arc::new(DetectProxy::new(ai_url, timeout).unwrap()),
            database: None,
        };
        rest::router(state, &self.files, 20 * 1024 * 1024)
    }

    pub fn token_for(&self, user_id: i64) -> String {
        self.security.generate_token(user_id).unwrap()
    }
}

/// Small JPEG as a data URL
pub fn jpeg_data_url() -> String {
    Frame::new(RgbImage::from_pixel(8, 8, Rgb([220, 40, 0])), 1)
        .to_data_url(0.7)
        .unwrap()
}

pub fn upload_request(user_id: i64, session: &str, sequence_index: i64) -> EvidenceUploadRequest {
    EvidenceUploadRequest {
        user_id: Some(LooseId::Number(user_id)),
        alert_type: Some("FIRE".to_string()),
        session_id: Some(LooseId::Text(session.to_string())),
        sequence_index: Some(sequence_index),
        timestamp: Some(1_700_000_000_000 + sequence_index * 1000),
        image: Some(jpeg_data_url()),
    }
}

/// Feeds monitor uploads straight into an [`EvidenceSink`]
pub struct SinkUploader {
    pub sink: Arc<EvidenceSink>,
}

#[async_trait]
impl EvidenceUploader for SinkUploader {
    async fn upload(&self, upload: EvidenceUpload) -> Result<UploadReceipt> {
        let receipt = self
            .sink
            .receive(EvidenceUploadRequest {
                user_id: Some(LooseId::Number(upload.user_id)),
                alert_type: Some(upload.alert_type),
                session_id: Some(LooseId::Text(upload.session_id)),
                sequence_index: Some(upload.sequence_index as i64),
                timestamp: Some(upload.timestamp),
                image: Some(upload.image),
            })
            .await?;

        Ok(UploadReceipt {
            ok: true,
            alert_id: receipt.alert_id,
            saved: receipt.saved,
        })
    }
}

pub async fn send(app: Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Response<axum::body::BoxBody> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<axum::body::BoxBody>) -> Value {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
