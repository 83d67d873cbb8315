use crate::db::models::{Alert, AlertEvidence, AlertStatus, NewAlert, NewEvidence};
use crate::db::repositories::AlertStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    alerts: Vec<Alert>,
    evidence: Vec<AlertEvidence>,
    next_alert_id: i64,
    next_evidence_id: i64,
}

/// Process-local alert store with the same idempotency rules as the
/// PostgreSQL store. Every operation runs under one lock.
#[derive(Default)]
pub struct MemoryAlertStore {
    tables: Mutex<Tables>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alert rows, across all users
    pub async fn alert_count(&self) -> usize {
        self.tables.lock().await.alerts.len()
    }

    /// Number of evidence rows, across all alerts
    pub async fn evidence_count(&self) -> usize {
        self.tables.lock().await.evidence.len()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn get_or_create_alert(&self, new_alert: &NewAlert) -> Result<(Alert, bool)> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables
            .alerts
            .iter()
            .find(|a| a.user_id == new_alert.user_id && a.session_key == new_alert.session_key)
        {
            return Ok((existing.clone(), false));
        }

        tables.next_alert_id += 1;
        let alert = Alert {
            id: tables.next_alert_id,
            user_id: new_alert.user_id,
            alert_type: new_alert.alert_type,
            session_key: new_alert.session_key.clone(),
            snapshot_url: None,
            status: AlertStatus::Pending,
            created_at: Utc::now(),
        };
        tables.alerts.push(alert.clone());

        Ok((alert, true))
    }

    async fn find_alert_by_session(
        &self,
        user_id: i64,
        session_key: &str,
    ) -> Result<Option<Alert>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .alerts
            .iter()
            .find(|a| a.user_id == user_id && a.session_key == session_key)
            .cloned())
    }

    async fn insert_evidence(&self, new_evidence: &NewEvidence) -> Result<AlertEvidence> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables.evidence.iter().find(|e| {
            e.alert_id == new_evidence.alert_id && e.sequence_index == new_evidence.sequence_index
        }) {
            return Ok(existing.clone());
        }

        tables.next_evidence_id += 1;
        let evidence = AlertEvidence {
            id: tables.next_evidence_id,
            alert_id: new_evidence.alert_id,
            session_id: new_evidence.session_id.clone(),
            sequence_index: new_evidence.sequence_index,
            image_url: new_evidence.image_url.clone(),
            timestamp: new_evidence.timestamp,
        };
        tables.evidence.push(evidence.clone());

        Ok(evidence)
    }

    async fn list_alerts(&self, user_id: i64) -> Result<Vec<Alert>> {
        let tables = self.tables.lock().await;
        let mut alerts: Vec<Alert> = tables
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(alerts)
    }

    async fn get_alert(&self, user_id: i64, alert_id: i64) -> Result<Option<Alert>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .alerts
            .iter()
            .find(|a| a.id == alert_id && a.user_id == user_id)
            .cloned())
    }

    async fn list_evidence(&self, alert_id: i64) -> Result<Vec<AlertEvidence>> {
        let tables = self.tables.lock().await;
        let mut evidence: Vec<AlertEvidence> = tables
            .evidence
            .iter()
            .filter(|e| e.alert_id == alert_id)
            .cloned()
            .collect();
        evidence.sort_by_key(|e| e.sequence_index);
        Ok(evidence)
    }

    async fn delete_alert(&self, user_id: i64, alert_id: i64) -> Result<bool> {
        let mut tables = self.tables.lock().await;

        let before = tables.alerts.len();
        tables
            .alerts
            .retain(|a| !(a.id == alert_id && a.user_id == user_id));
        if tables.alerts.len() == before {
            return Ok(false);
        }

        tables.evidence.retain(|e| e.alert_id != alert_id);
        Ok(true)
    }
}
