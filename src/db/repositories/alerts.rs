use crate::db::models::{Alert, AlertEvidence, NewAlert, NewEvidence};
use crate::db::repositories::AlertStore;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;

const ALERT_COLUMNS: &str = "id, user_id, alert_type, session_key, snapshot_url, status, created_at";
const EVIDENCE_COLUMNS: &str = "id, alert_id, session_id, sequence_index, image_url, timestamp";

/// PostgreSQL-backed alert store
#[derive(Clone)]
pub struct PgAlertStore {
    pool: Arc<PgPool>,
}

impl PgAlertStore {
    /// Create a new alerts repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for PgAlertStore {
    async fn get_or_create_alert(&self, new_alert: &NewAlert) -> Result<(Alert, bool)> {
        // The unique index on (user_id, session_key) turns a racing second
        // insert into a no-op; the loser then reads the winner's row.
        let inserted = sqlx::query_as::<_, Alert>(&format!(
            r#"
            INSERT INTO alerts (user_id, alert_type, session_key, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (user_id, session_key) DO NOTHING
            RETURNING {}
            "#,
            ALERT_COLUMNS
        ))
        .bind(new_alert.user_id)
        .bind(new_alert.alert_type)
        .bind(&new_alert.session_key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create alert: {}", e)))?;

        if let Some(alert) = inserted {
            return Ok((alert, true));
        }

        let existing = self
            .find_alert_by_session(new_alert.user_id, &new_alert.session_key)
            .await?
            .ok_or_else(|| {
                Error::Database(format!(
                    "Alert for session {} vanished after conflict",
                    new_alert.session_key
                ))
            })?;

        Ok((existing, false))
    }

    async fn find_alert_by_session(
        &self,
        user_id: i64,
        session_key: &str,
    ) -> Result<Option<Alert>> {
        let result = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE user_id = $1 AND session_key = $2
            "#,
            ALERT_COLUMNS
        ))
        .bind(user_id)
        .bind(session_key)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get alert by session: {}", e)))?;

        Ok(result)
    }

    async fn insert_evidence(&self, new_evidence: &NewEvidence) -> Result<AlertEvidence> {
        let inserted = sqlx::query_as::<_, AlertEvidence>(&format!(
            r#"
            INSERT INTO alert_evidence (alert_id, session_id, sequence_index, image_url, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (alert_id, sequence_index) DO NOTHING
            RETURNING {}
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(new_evidence.alert_id)
        .bind(&new_evidence.session_id)
        .bind(new_evidence.sequence_index)
        .bind(&new_evidence.image_url)
        .bind(new_evidence.timestamp)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create evidence: {}", e)))?;

        if let Some(evidence) = inserted {
            return Ok(evidence);
        }

        let existing = sqlx::query_as::<_, AlertEvidence>(&format!(
            r#"
            SELECT {}
            FROM alert_evidence
            WHERE alert_id = $1 AND sequence_index = $2
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(new_evidence.alert_id)
        .bind(new_evidence.sequence_index)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get existing evidence: {}", e)))?;

        Ok(existing)
    }

    async fn list_alerts(&self, user_id: i64) -> Result<Vec<Alert>> {
        let result = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
            ALERT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list alerts: {}", e)))?;

        Ok(result)
    }

    async fn get_alert(&self, user_id: i64, alert_id: i64) -> Result<Option<Alert>> {
        let result = sqlx::query_as::<_, Alert>(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE id = $1 AND user_id = $2
            "#,
            ALERT_COLUMNS
        ))
        .bind(alert_id)
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get alert by ID: {}", e)))?;

        Ok(result)
    }

    async fn list_evidence(&self, alert_id: i64) -> Result<Vec<AlertEvidence>> {
        let result = sqlx::query_as::<_, AlertEvidence>(&format!(
            r#"
            SELECT {}
            FROM alert_evidence
            WHERE alert_id = $1
            ORDER BY sequence_index ASC
            "#,
            EVIDENCE_COLUMNS
        ))
        .bind(alert_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list evidence: {}", e)))?;

        Ok(result)
    }

    async fn delete_alert(&self, user_id: i64, alert_id: i64) -> Result<bool> {
        // alert_evidence rows go with the alert through ON DELETE CASCADE
        let result = sqlx::query(
            r#"
            DELETE FROM alerts
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(alert_id)
        .bind(user_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to delete alert: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use crate::db::models::AlertType;
    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;

    async fn test_store() -> Result<Option<PgAlertStore>> {
        // Skip test if no PostgreSQL is available
        let url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping PostgreSQL test. Set TEST_DATABASE_URL to run.");
                return Ok(None);
            }
        };

        let pool = PgPoolOptions::new().max_connections(4).connect(&url).await?;
        migrations::run_migrations(&pool)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        sqlx::query("INSERT INTO users (id, email, display_name, password_hash) VALUES (424242, 'pg-test@localhost', 'pg test', 'x') ON CONFLICT (id) DO NOTHING")
            .execute(&pool)
            .await?;

        Ok(Some(PgAlertStore::new(Arc::new(pool))))
    }

    #[tokio::test]
    async fn test_concurrent_first_uploads_share_one_alert() -> Result<()> {
        let Some(store) = test_store().await? else {
            return Ok(());
        };

        let new_alert = NewAlert {
            user_id: 424242,
            alert_type: AlertType::Fire,
            session_key: uuid::Uuid::new_v4().to_string(),
        };

        let (a, b) = tokio::join!(
            store.get_or_create_alert(&new_alert),
            store.get_or_create_alert(&new_alert)
        );
        let (a, b) = (a?, b?);
        assert_eq!(a.0.id, b.0.id);
        assert!(a.1 ^ b.1, "exactly one call should report creation");

        for index in [2, 1, 2] {
            store
                .insert_evidence(&NewEvidence {
                    alert_id: a.0.id,
                    session_id: new_alert.session_key.clone(),
                    sequence_index: index,
                    image_url: format!("uploads/evidence_{}_{}.jpg", a.0.id, index),
                    timestamp: Utc::now(),
                })
                .await?;
        }

        let evidence = store.list_evidence(a.0.id).await?;
        let indices: Vec<i32> = evidence.iter().map(|e| e.sequence_index).collect();
        assert_eq!(indices, vec![1, 2]);

        assert!(store.delete_alert(424242, a.0.id).await?);
        assert!(store.list_evidence(a.0.id).await?.is_empty());
        Ok(())
    }
}
