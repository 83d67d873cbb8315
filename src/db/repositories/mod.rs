use crate::db::models::{Alert, AlertEvidence, NewAlert, NewEvidence};
use anyhow::Result;
use async_trait::async_trait;

pub mod alerts;
pub mod memory;

pub use alerts::PgAlertStore;
pub use memory::MemoryAlertStore;

/// Persistence boundary for alerts and their evidence.
///
/// Both creation paths are insert-or-fetch: `(user_id, session_key)` identifies
/// an alert and `(alert_id, sequence_index)` identifies an evidence row, so
/// concurrent or retried uploads converge on the same rows.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Fetch the alert for a session, creating it as `pending` if absent.
    /// The flag is `true` when this call created the row.
    async fn get_or_create_alert(&self, new_alert: &NewAlert) -> Result<(Alert, bool)>;

    async fn find_alert_by_session(&self, user_id: i64, session_key: &str)
        -> Result<Option<Alert>>;

    /// Insert an evidence row, or return the existing one for the same
    /// `(alert_id, sequence_index)`.
    async fn insert_evidence(&self, new_evidence: &NewEvidence) -> Result<AlertEvidence>;

    /// Alerts owned by a user, newest first
    async fn list_alerts(&self, user_id: i64) -> Result<Vec<Alert>>;

    async fn get_alert(&self, user_id: i64, alert_id: i64) -> Result<Option<Alert>>;

    /// Evidence of an alert ordered by sequence index
    async fn list_evidence(&self, alert_id: i64) -> Result<Vec<AlertEvidence>>;

    /// Delete an alert owned by `user_id` together with its evidence rows.
    /// Returns `false` when no such alert exists.
    async fn delete_alert(&self, user_id: i64, alert_id: i64) -> Result<bool>;
}
