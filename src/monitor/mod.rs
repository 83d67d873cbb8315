//! Client-side pipeline: sample the live source, poll remote inference,
//! and capture evidence for at most one alert session at a time.

pub mod alert_log;
pub mod alert_tone;
pub mod coordinator;
pub mod detection;
pub mod frame;
#[cfg(feature = "gstreamer-source")]
pub mod gst_source;
pub mod sampler;
pub mod sequencer;
pub mod sources;
pub mod uploader;

pub use alert_log::{AlertLog, AlertLogEntry, LogStatus};
pub use alert_tone::{AlertTone, Silent, TerminalBell, ALERT_PATTERN};
pub use coordinator::{AlertSessionCoordinator, CaptureRunner, CoordinatorState};
pub use detection::{
    DetectionClient, DetectionResult, DetectionStatsSnapshot, HttpInferenceClient, InferenceBackend, TriggerType,
};
pub use frame::Frame;
pub use sampler::{FrameReader, FrameSampler};
pub use sequencer::{AlertSession, CapturedSession, EvidenceCaptureSequencer, SequencerSettings, UploadSummary};
pub use sources::{build_source, FrameSource};
pub use uploader::{EvidenceUpload, EvidenceUploader, HttpEvidenceUploader};

use crate::config::MonitorConfig;
use crate::error::Error;
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Who the pipeline runs for; passed explicitly to every stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorContext {
    pub user_id: i64,
}

/// The assembled pipeline and its background tasks
pub struct Monitor {
    sampler: Arc<FrameSampler>,
    detection: Arc<DetectionClient>,
    coordinator: Arc<AlertSessionCoordinator>,
    alert_log: AlertLog,
    pending: Option<(Box<dyn FrameSource>, mpsc::Receiver<TriggerType>)>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Monitor {
    pub fn new(
        config: &MonitorConfig,
        source: Box<dyn FrameSource>,
        inference: Arc<dyn InferenceBackend>,
        uploader: Arc<dyn EvidenceUploader>,
        tone: Arc<dyn AlertTone>,
    ) -> Self {
        let context = MonitorContext {
            user_id: config.user_id,
        };
        let sampler = Arc::new(FrameSampler::new(config.source.sample_interval()));
        let alert_log = AlertLog::new();
        let (trigger_tx, trigger_rx) = mpsc::channel(config.detection.trigger_buffer.max(1));

        let detection = Arc::new(DetectionClient::new(
            inference,
            sampler.reader(),
            context.clone(),
            &config.detection,
            trigger_tx,
        ));

        let sequencer = EvidenceCaptureSequencer::new(
            sampler.reader(),
            uploader,
            tone,
            alert_log.clone(),
            SequencerSettings::from(&config.capture),
        );
        let coordinator = Arc::new(AlertSessionCoordinator::new(Arc::new(sequencer), context));

        Self {
            sampler,
            detection,
            coordinator,
            alert_log,
            pending: Some((source, trigger_rx)),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Build the pipeline with HTTP inference and upload
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let source = build_source(&config.source)?;
        let inference = Arc::new(HttpInferenceClient::new(&config.detection.url, config.detection.timeout())?);
        let uploader = Arc::new(HttpEvidenceUploader::new(
            &config.capture.evidence_url,
            config.capture.upload_timeout(),
        )?);
        let tone: Arc<dyn AlertTone> = if config.capture.sound_enabled {
            Arc::new(TerminalBell)
        } else {
            Arc::new(Silent)
        };

        Ok(Self::new(config, source, inference, uploader, tone))
    }

    /// Spawn the sampler, detection and coordinator loops
    pub fn start(&mut self) -> Result<()> {
        let (source, triggers) = self
            .pending
            .take()
            .ok_or_else(|| Error::Internal("Monitor already started".to_string()))?;

        self.tasks.push(tokio::spawn(Arc::clone(&self.sampler).run(source, self.cancel.clone())));
        self.tasks.push(tokio::spawn(Arc::clone(&self.detection).run(self.cancel.clone())));
        self.tasks
            .push(tokio::spawn(Arc::clone(&self.coordinator).run(triggers, self.cancel.clone())));

        info!("Monitor started");
        Ok(())
    }

    pub fn frames(&self) -> FrameReader {
        self.sampler.reader()
    }

    /// Latest detection result, for overlays
    pub fn detections(&self) -> watch::Receiver<DetectionResult> {
        self.detection.subscribe()
    }

    pub fn detection_stats(&self) -> DetectionStatsSnapshot {
        self.detection.stats()
    }

    pub fn alert_log(&self) -> AlertLog {
        self.alert_log.clone()
    }

    pub fn coordinator(&self) -> Arc<AlertSessionCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Stop polling, then give a running session up to `grace` to finish
    pub async fn shutdown(mut self, grace: Duration) -> DetectionStatsSnapshot {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Monitor task ended abnormally: {}", e);
            }
        }

        if tokio::time::timeout(grace, self.coordinator.wait_idle()).await.is_err() {
            warn!("Alert session still running after {:?}, abandoning it", grace);
        }
        info!("Monitor stopped");
        self.detection.stats()
    }
}
