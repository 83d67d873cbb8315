use crate::db::models::{Alert, AlertDetail};
use crate::db::repositories::AlertStore;
use crate::error::Error;
use crate::services::evidence_files::EvidenceFiles;
use anyhow::Result;
use log::{info, warn};
use std::sync::Arc;

/// Read and delete access to a user's alerts
pub struct AlertHistory {
    store: Arc<dyn AlertStore>,
    files: EvidenceFiles,
}

impl AlertHistory {
    pub fn new(store: Arc<dyn AlertStore>, files: EvidenceFiles) -> Self {
        Self { store, files }
    }

    /// Alerts of a user, newest first
    pub async fn list(&self, user_id: i64) -> Result<Vec<Alert>> {
        self.store.list_alerts(user_id).await
    }

    /// Alert with its evidence ordered by sequence index
    pub async fn detail(&self, user_id: i64, alert_id: i64) -> Result<AlertDetail> {
        let alert = self
            .store
            .get_alert(user_id, alert_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Alert not found: {}", alert_id)))?;
        let evidences = self.store.list_evidence(alert.id).await?;

        Ok(AlertDetail { alert, evidences })
    }

    /// Delete an alert, its evidence rows and the image files behind them.
    ///
    /// File removal failures are logged and do not keep the rows alive.
    pub async fn delete(&self, user_id: i64, alert_id: i64) -> Result<()> {
        let alert = self
            .store
            .get_alert(user_id, alert_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Alert not found or permission denied: {}",
                    alert_id
                ))
            })?;

        let evidences = self.store.list_evidence(alert.id).await?;

        let mut image_urls: Vec<&str> = evidences.iter().map(|e| e.image_url.as_str()).collect();
        if let Some(snapshot) = alert.snapshot_url.as_deref() {
            image_urls.push(snapshot);
        }

        for url in image_urls {
            if let Err(e) = self.files.remove(url).await {
                warn!("Keeping going after failing to delete {}: {}", url, e);
            }
        }

        if !self.store.delete_alert(user_id, alert.id).await? {
            return Err(Error::NotFound(format!("Alert not found: {}", alert_id)).into());
        }

        info!(
            "Deleted alert {} with {} evidence images",
            alert.id,
            evidences.len()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AlertType, NewAlert, NewEvidence};
    use crate::db::repositories::MemoryAlertStore;
    use chrono::Utc;

    async fn seeded(
        dir: &tempfile::TempDir,
    ) -> Result<(Arc<MemoryAlertStore>, AlertHistory, i64)> {
        let store = Arc::new(MemoryAlertStore::new());
        let files = EvidenceFiles::new(dir.path(), "uploads");

        let (alert, _) = store
            .get_or_create_alert(&NewAlert {
                user_id: 7,
                alert_type: AlertType::Fire,
                session_key: "s".to_string(),
            })
            .await?;

        for index in [2, 1] {
            let url = files.write(alert.id, index, b"jpeg").await?.url;
            store
                .insert_evidence(&NewEvidence {
                    alert_id: alert.id,
                    session_id: "s".to_string(),
                    sequence_index: index,
                    image_url: url,
                    timestamp: Utc::now(),
                })
                .await?;
        }

        let history = AlertHistory::new(store.clone(), files);
        Ok((store, history, alert.id))
    }

    #[tokio::test]
    async fn test_detail_orders_evidence_and_hides_foreign_alerts() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (_store, history, alert_id) = seeded(&dir).await?;

        let detail = history.detail(7, alert_id).await?;
        let indices: Vec<i32> = detail.evidences.iter().map(|e| e.sequence_index).collect();
        assert_eq!(indices, vec![1, 2]);

        let err = history.detail(8, alert_id).await.unwrap_err();
        assert!(matches!(
            crate::error::as_error(&err),
            Some(Error::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_cascades_rows_and_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let (store, history, alert_id) = seeded(&dir).await?;

        assert!(history.delete(8, alert_id).await.is_err());
        assert_eq!(store.evidence_count().await, 2);

        history.delete(7, alert_id).await?;
        assert_eq!(store.alert_count().await, 0);
        assert_eq!(store.evidence_count().await, 0);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
        assert!(history.list(7).await?.is_empty());
        Ok(())
    }
}
