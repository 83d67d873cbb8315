use super::alert_log::AlertLog;
use super::alert_tone::{AlertTone, ALERT_PATTERN};
use super::coordinator::CaptureRunner;
use super::detection::TriggerType;
use super::sampler::FrameReader;
use super::uploader::{EvidenceUpload, EvidenceUploader, UploadReceipt};
use super::MonitorContext;
use crate::config::CaptureConfig;
use crate::error::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Capture cadence for one session
#[derive(Debug, Clone)]
pub struct SequencerSettings {
    pub capture_count: u32,
    pub frame_interval: Duration,
    pub jpeg_quality: f32,
}

impl From<&CaptureConfig> for SequencerSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            capture_count: config.capture_count,
            frame_interval: config.frame_interval(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

/// Outcome of one alert session
#[derive(Debug, Clone)]
pub struct AlertSession {
    pub session_id: String,
    pub trigger: TriggerType,
    pub user_id: i64,
    pub started_at: DateTime<Utc>,
    /// Uploads issued
    pub frames_sent: u32,
    /// Ticks with no frame to capture
    pub frames_skipped: u32,
    /// Frames that could not be encoded
    pub frames_failed: u32,
}

/// How the uploads of one session settled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub saved: u32,
    pub failed: u32,
}

/// A finished capture loop whose uploads may still be in flight
#[derive(Debug)]
pub struct CapturedSession {
    pub session: AlertSession,
    /// Resolves once every issued upload has settled
    pub uploads: JoinHandle<UploadSummary>,
}

impl AlertSession {
    fn start(trigger: TriggerType, user_id: i64) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            trigger,
            user_id,
            started_at: Utc::now(),
            frames_sent: 0,
            frames_skipped: 0,
            frames_failed: 0,
        }
    }
}

/// Captures a fixed series of snapshots and uploads each one as evidence
pub struct EvidenceCaptureSequencer {
    frames: FrameReader,
    uploader: Arc<dyn EvidenceUploader>,
    tone: Arc<dyn AlertTone>,
    log: AlertLog,
    settings: SequencerSettings,
}

impl EvidenceCaptureSequencer {
    pub fn new(
        frames: FrameReader,
        uploader: Arc<dyn EvidenceUploader>,
        tone: Arc<dyn AlertTone>,
        log: AlertLog,
        settings: SequencerSettings,
    ) -> Self {
        Self {
            frames,
            uploader,
            tone,
            log,
            settings,
        }
    }

    /// Run one session's capture loop.
    ///
    /// Returns as soon as every tick has been attempted; uploads keep
    /// running in the background and are summarised by the returned handle.
    pub async fn capture(&self, trigger: TriggerType, context: &MonitorContext) -> CapturedSession {
        let mut session = AlertSession::start(trigger, context.user_id);
        info!(
            "Alert session {} started ({}), capturing {} frames",
            session.session_id, trigger, self.settings.capture_count
        );
        self.log.begin(&session.session_id, trigger, session.started_at);
        self.tone.play(&ALERT_PATTERN);

        let mut uploads = Vec::with_capacity(self.settings.capture_count as usize);
        for sequence_index in 1..=self.settings.capture_count {
            match self.snapshot(&session, sequence_index) {
                Some(Ok(upload)) => {
                    let uploader = Arc::clone(&self.uploader);
                    uploads.push(tokio::spawn(async move {
                        let index = upload.sequence_index;
                        (index, uploader.upload(upload).await)
                    }));
                    session.frames_sent += 1;
                }
                Some(Err(e)) => {
                    warn!(
                        "Session {} frame {} not encoded: {}",
                        session.session_id, sequence_index, e
                    );
                    session.frames_failed += 1;
                }
                None => {
                    debug!("Session {} frame {}: no frame available", session.session_id, sequence_index);
                    session.frames_skipped += 1;
                }
            }

            tokio::time::sleep(self.settings.frame_interval).await;
        }

        self.log.complete(&session.session_id);
        info!(
            "Alert session {} done: {}/{} frames sent, {} skipped, {} not encoded",
            session.session_id,
            session.frames_sent,
            self.settings.capture_count,
            session.frames_skipped,
            session.frames_failed
        );

        let uploads = tokio::spawn(summarise_uploads(session.session_id.clone(), uploads));
        CapturedSession { session, uploads }
    }

    fn snapshot(&self, session: &AlertSession, sequence_index: u32) -> Option<Result<EvidenceUpload, Error>> {
        let frame = self.frames.latest()?;
        Some(frame.to_data_url(self.settings.jpeg_quality).map(|image| EvidenceUpload {
            user_id: session.user_id,
            image,
            alert_type: session.trigger.as_str().to_string(),
            session_id: session.session_id.clone(),
            sequence_index,
            timestamp: Utc::now().timestamp_millis(),
        }))
    }
}

async fn summarise_uploads(
    session_id: String,
    uploads: Vec<JoinHandle<(u32, anyhow::Result<UploadReceipt>)>>,
) -> UploadSummary {
    let mut summary = UploadSummary::default();
    for outcome in join_all(uploads).await {
        match outcome {
            Ok((_, Ok(receipt))) => {
                debug!("Evidence saved to {}", receipt.saved);
                summary.saved += 1;
            }
            Ok((index, Err(e))) => {
                warn!("Session {} upload {} failed: {:#}", session_id, index, e);
                summary.failed += 1;
            }
            Err(e) => {
                warn!("Session {} upload task failed: {}", session_id, e);
                summary.failed += 1;
            }
        }
    }
    info!(
        "Alert session {} uploads settled: {} saved, {} failed",
        session_id, summary.saved, summary.failed
    );
    summary
}

#[async_trait]
impl CaptureRunner for EvidenceCaptureSequencer {
    async fn run(&self, trigger: TriggerType, context: &MonitorContext) {
        // The upload summary task is detached; the capture slot is freed now
        self.capture(trigger, context).await;
    }
}
