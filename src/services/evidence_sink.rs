use crate::db::models::{AlertType, NewAlert, NewEvidence};
use crate::db::repositories::AlertStore;
use crate::error::Error;
use crate::services::evidence_files::EvidenceFiles;
use crate::utils::data_url;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifier that clients send either as a JSON number or a string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LooseId {
    Number(i64),
    Text(String),
}

impl LooseId {
    fn into_text(self) -> Option<String> {
        let text = match self {
            LooseId::Number(n) => n.to_string(),
            LooseId::Text(s) => s.trim().to_string(),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Body of `POST /api/alerts/evidence`. Every field is optional on the wire so
/// that absence is reported as a validation error rather than a decode error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvidenceUploadRequest {
    #[serde(rename = "userID")]
    pub user_id: Option<LooseId>,
    #[serde(rename = "alertType")]
    pub alert_type: Option<String>,
    #[serde(rename = "sessionID")]
    pub session_id: Option<LooseId>,
    #[serde(rename = "sequenceIndex")]
    pub sequence_index: Option<i64>,
    /// Capture time in Unix milliseconds
    pub timestamp: Option<i64>,
    /// JPEG as a data URL or bare base64
    pub image: Option<String>,
}

/// A request that passed validation, with its image already decoded
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub user_id: i64,
    pub alert_type: AlertType,
    pub session_id: String,
    pub sequence_index: i32,
    pub timestamp: DateTime<Utc>,
    pub image: Vec<u8>,
}

impl EvidenceUploadRequest {
    pub fn validate(self) -> Result<ValidatedUpload, Error> {
        let user_id = self.user_id.and_then(LooseId::into_text);
        let alert_type = self.alert_type.filter(|s| !s.trim().is_empty());
        let session_id = self.session_id.and_then(LooseId::into_text);
        let image = self.image.filter(|s| !s.trim().is_empty());

        let mut missing = Vec::new();
        if user_id.is_none() {
            missing.push("userID");
        }
        if alert_type.is_none() {
            missing.push("alertType");
        }
        if session_id.is_none() {
            missing.push("sessionID");
        }
        if image.is_none() {
            missing.push("image");
        }
        if self.sequence_index.is_none() {
            missing.push("sequenceIndex");
        }

        let (Some(user_id), Some(alert_type), Some(session_id), Some(image), Some(sequence_index)) =
            (user_id, alert_type, session_id, image, self.sequence_index)
        else {
            return Err(Error::Validation(format!(
                "Missing fields: {}",
                missing.join(", ")
            )));
        };

        let user_id = user_id
            .parse::<i64>()
            .map_err(|_| Error::Validation(format!("userID is not numeric: {}", user_id)))?;
        let alert_type = alert_type.parse::<AlertType>()?;
        let sequence_index = i32::try_from(sequence_index)
            .ok()
            .filter(|index| *index >= 1)
            .ok_or_else(|| {
                Error::Validation(format!("sequenceIndex out of range: {}", sequence_index))
            })?;
        let timestamp = match self.timestamp {
            Some(ms) => DateTime::<Utc>::from_timestamp_millis(ms)
                .ok_or_else(|| Error::Validation(format!("timestamp out of range: {}", ms)))?,
            None => Utc::now(),
        };
        let image = data_url::decode(&image)?;

        Ok(ValidatedUpload {
            user_id,
            alert_type,
            session_id,
            sequence_index,
            timestamp,
            image,
        })
    }
}

/// Outcome of one accepted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceReceipt {
    pub alert_id: i64,
    pub evidence_id: i64,
    /// URL of the stored image
    pub saved: String,
    /// Whether this upload created the session's alert
    pub created_alert: bool,
}

/// Server-side aggregator that folds independent snapshot uploads into one
/// alert per `(user, session)`.
pub struct EvidenceSink {
    store: Arc<dyn AlertStore>,
    files: EvidenceFiles,
}

impl EvidenceSink {
    pub fn new(store: Arc<dyn AlertStore>, files: EvidenceFiles) -> Self {
        Self { store, files }
    }

    /// Accept one snapshot.
    ///
    /// Arrival order is irrelevant: the row stores whatever `sequenceIndex`
    /// the sender asserted. Nothing is written when validation fails.
    pub async fn receive(&self, request: EvidenceUploadRequest) -> Result<EvidenceReceipt> {
        let upload = request.validate()?;

        let (alert, created_alert) = self
            .store
            .get_or_create_alert(&NewAlert {
                user_id: upload.user_id,
                alert_type: upload.alert_type,
                session_key: upload.session_id.clone(),
            })
            .await?;

        if created_alert {
            info!(
                "Created alert {} ({}) for user {} session {}",
                alert.id, alert.alert_type, alert.user_id, alert.session_key
            );
        }

        let stored = self
            .files
            .write(alert.id, upload.sequence_index, &upload.image)
            .await
            .map_err(|e| {
                error!(
                    "Failed to store evidence {} for alert {}: {}",
                    upload.sequence_index, alert.id, e
                );
                e
            })?;

        let evidence = match self
            .store
            .insert_evidence(&NewEvidence {
                alert_id: alert.id,
                session_id: upload.session_id,
                sequence_index: upload.sequence_index,
                image_url: stored.url.clone(),
                timestamp: upload.timestamp,
            })
            .await
        {
            Ok(evidence) => evidence,
            Err(e) => {
                error!(
                    "Failed to record evidence {} for alert {}: {:#}",
                    upload.sequence_index, alert.id, e
                );
                // Only a file this call created is unreferenced
                if stored.created {
                    if let Err(cleanup) = self.files.remove(&stored.url).await {
                        warn!("Orphaned evidence file {}: {:#}", stored.url, cleanup);
                    }
                }
                return Err(e);
            }
        };

        info!(
            "Stored evidence sequence {} for alert {}",
            evidence.sequence_index, alert.id
        );

        Ok(EvidenceReceipt {
            alert_id: alert.id,
            evidence_id: evidence.id,
            saved: stored.url,
            created_alert,
        })
    }
}
