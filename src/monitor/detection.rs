//! Periodic remote inference over the latest sampled frame.

use super::frame::Frame;
use super::sampler::FrameReader;
use super::MonitorContext;
use crate::config::DetectionConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Event class reported by the inference service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DetectionLabel {
    Fire,
    Smoke,
    Fall,
    Other(String),
}

impl DetectionLabel {
    /// Upper-case, `-`/`_` as spaces, runs of whitespace collapsed
    pub fn normalize(raw: &str) -> String {
        raw.to_uppercase()
            .replace(['-', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<String> for DetectionLabel {
    fn from(label: String) -> Self {
        let normalized = DetectionLabel::normalize(&label);
        match normalized.as_str() {
            "FIRE" => DetectionLabel::Fire,
            "SMOKE" => DetectionLabel::Smoke,
            "FALL" => DetectionLabel::Fall,
            _ => DetectionLabel::Other(normalized),
        }
    }
}

impl From<DetectionLabel> for String {
    fn from(label: DetectionLabel) -> Self {
        label.to_string()
    }
}

impl fmt::Display for DetectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionLabel::Fire => write!(f, "FIRE"),
            DetectionLabel::Smoke => write!(f, "SMOKE"),
            DetectionLabel::Fall => write!(f, "FALL"),
            DetectionLabel::Other(label) => write!(f, "{}", label),
        }
    }
}

/// Corner coordinates in source-frame pixels, `[x1, y1, x2, y2]` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).abs()
    }

    /// Map into a display of another size, e.g. for an overlay
    pub fn scaled(&self, from: (u32, u32), to: (u32, u32)) -> BoundingBox {
        if from.0 == 0 || from.1 == 0 {
            return *self;
        }
        let sx = to.0 as f32 / from.0 as f32;
        let sy = to.1 as f32 / from.1 as f32;
        BoundingBox {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: DetectionLabel,
    #[serde(rename = "box")]
    pub bounding_box: BoundingBox,
    pub confidence: f32,
}

/// Classification that starts an alert session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerType {
    Fire,
    Fall,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Fire => "FIRE",
            TriggerType::Fall => "FALL",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIRE" => Ok(TriggerType::Fire),
            "FALL" => Ok(TriggerType::Fall),
            other => Err(Error::Validation(format!("Unknown alert trigger: {}", other))),
        }
    }
}

/// Outcome of one inference call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub trigger: Option<TriggerType>,
    pub frame_width: Option<u32>,
    pub frame_height: Option<u32>,
}

impl DetectionResult {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.trigger.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    alert_trigger: Option<String>,
    #[serde(default)]
    frame_width: Option<u32>,
    #[serde(default)]
    frame_height: Option<u32>,
}

impl From<InferenceResponse> for DetectionResult {
    fn from(response: InferenceResponse) -> Self {
        let trigger = response
            .alert_trigger
            .filter(|t| !t.trim().is_empty())
            .and_then(|t| match t.parse::<TriggerType>() {
                Ok(trigger) => Some(trigger),
                Err(e) => {
                    warn!("Ignoring trigger from inference: {}", e);
                    None
                }
            });

        DetectionResult {
            detections: response.detections,
            trigger,
            frame_width: response.frame_width,
            frame_height: response.frame_height,
        }
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    image: &'a str,
    #[serde(rename = "userID")]
    user_id: i64,
}

/// Remote object detector
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Classify one JPEG data URL on behalf of `user_id`
    async fn detect(&self, image: &str, user_id: i64) -> Result<DetectionResult>;
}

/// `POST {image, userID}` to an HTTP inference service
pub struct HttpInferenceClient {
    client: reqwest::Client,
    url: Url,
}

impl HttpInferenceClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::Config(format!("Invalid inference URL {}: {}", url, e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl InferenceBackend for HttpInferenceClient {
    async fn detect(&self, image: &str, user_id: i64) -> Result<DetectionResult> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&InferenceRequest { image, user_id })
            .send()
            .await
            .map_err(Error::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("Inference service returned {}", status)).into());
        }

        let body: InferenceResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Malformed inference response: {}", e)))?;
        Ok(body.into())
    }
}

/// Counters that keep "service down" distinguishable from "nothing seen"
#[derive(Debug, Default)]
pub struct DetectionStats {
    polls: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
    triggers: AtomicU64,
    triggers_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStatsSnapshot {
    /// Inference calls made
    pub polls: u64,
    /// Ticks with no frame ready
    pub skipped: u64,
    /// Calls that failed and degraded to an empty result
    pub failures: u64,
    pub triggers: u64,
    /// Triggers the coordinator channel had no room for
    pub triggers_dropped: u64,
}

impl DetectionStats {
    pub fn snapshot(&self) -> DetectionStatsSnapshot {
        DetectionStatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            triggers: self.triggers.load(Ordering::Relaxed),
            triggers_dropped: self.triggers_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Polls inference with the latest frame and forwards triggers
pub struct DetectionClient {
    backend: Arc<dyn InferenceBackend>,
    frames: FrameReader,
    context: MonitorContext,
    interval: Duration,
    timeout: Duration,
    jpeg_quality: f32,
    latest: watch::Sender<DetectionResult>,
    triggers: mpsc::Sender<TriggerType>,
    stats: DetectionStats,
}

impl DetectionClient {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        frames: FrameReader,
        context: MonitorContext,
        config: &DetectionConfig,
        triggers: mpsc::Sender<TriggerType>,
    ) -> Self {
        let (latest, _) = watch::channel(DetectionResult::default());
        Self {
            backend,
            frames,
            context,
            interval: config.interval(),
            timeout: config.timeout(),
            jpeg_quality: config.jpeg_quality,
            latest,
            triggers,
            stats: DetectionStats::default(),
        }
    }

    /// Latest published result, for overlays
    pub fn subscribe(&self) -> watch::Receiver<DetectionResult> {
        self.latest.subscribe()
    }

    pub fn stats(&self) -> DetectionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Run one frame through inference, bounded by the configured timeout
    pub async fn submit_frame(&self, frame: &Frame) -> Result<DetectionResult> {
        let image = frame.to_data_url(self.jpeg_quality)?;

        match tokio::time::timeout(self.timeout, self.backend.detect(&image, self.context.user_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Transport(format!("Inference timed out after {:?}", self.timeout)).into()),
        }
    }

    /// One polling tick. Returns `None` when no frame was ready.
    pub async fn poll_once(&self) -> Option<DetectionResult> {
        let Some(frame) = self.frames.latest() else {
            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        self.stats.polls.fetch_add(1, Ordering::Relaxed);
        let result = match self.submit_frame(&frame).await {
            Ok(result) => result,
            Err(e) => {
                let failures = self.stats.failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == 1 || failures % 20 == 0 {
                    warn!("Detection failed ({} so far): {:#}", failures, e);
                } else {
                    debug!("Detection failed: {:#}", e);
                }
                DetectionResult::default()
            }
        };

        self.latest.send_replace(result.clone());

        if let Some(trigger) = result.trigger {
            self.stats.triggers.fetch_add(1, Ordering::Relaxed);
            match self.triggers.try_send(trigger) {
                Ok(()) => debug!("Trigger {} forwarded (frame {})", trigger, frame.sequence),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.stats.triggers_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("Trigger {} dropped, coordinator busy", trigger);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.stats.triggers_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Trigger {} dropped, coordinator gone", trigger);
                }
            }
        }

        Some(result)
    }

    /// Poll every interval until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Detection polling every {:?} for user {}",
            self.interval, self.context.user_id
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.poll_once() => {}
            }
        }

        let stats = self.stats();
        info!(
            "Detection stopped: {} polls, {} failures, {} triggers",
            stats.polls, stats.failures, stats.triggers
        );
    }
}
