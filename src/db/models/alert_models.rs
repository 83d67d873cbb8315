use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of abnormal situation an alert was raised for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "alert_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Fire,
    Fall,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Fire => "fire",
            AlertType::Fall => "fall",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = Error;

    /// Case-insensitive: clients send `FIRE`, storage keeps `fire`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fire" => Ok(AlertType::Fire),
            "fall" => Ok(AlertType::Fall),
            other => Err(Error::Validation(format!("Unknown alert type: {}", other))),
        }
    }
}

/// Delivery status of an alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "alert_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Sent,
}

/// Alert model, one row per capture session
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "alertID")]
    pub id: i64,
    #[serde(rename = "userID")]
    pub user_id: i64,
    pub alert_type: AlertType,
    /// Client-generated session identifier
    pub session_key: String,
    pub snapshot_url: Option<String>,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
}

/// One stored snapshot of a capture session
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvidence {
    #[serde(rename = "evidenceID")]
    pub id: i64,
    #[serde(rename = "alertID")]
    pub alert_id: i64,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub sequence_index: i32,
    pub image_url: String,
    pub timestamp: DateTime<Utc>,
}

/// Alert together with its evidence, ordered by sequence index
#[derive(Debug, Clone, Serialize)]
pub struct AlertDetail {
    #[serde(flatten)]
    pub alert: Alert,
    pub evidences: Vec<AlertEvidence>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub user_id: i64,
    pub alert_type: AlertType,
    pub session_key: String,
}

#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub alert_id: i64,
    pub session_id: String,
    pub sequence_index: i32,
    pub image_url: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_type_parses_any_case() {
        assert_eq!("FIRE".parse::<AlertType>().unwrap(), AlertType::Fire);
        assert_eq!("Fall".parse::<AlertType>().unwrap(), AlertType::Fall);
        assert!(matches!(
            "smoke".parse::<AlertType>(),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn alert_serializes_with_wire_names() {
        let alert = Alert {
            id: 3,
            user_id: 7,
            alert_type: AlertType::Fire,
            session_key: "abc".to_string(),
            snapshot_url: None,
            status: AlertStatus::Pending,
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["alertID"], 3);
        assert_eq!(json["userID"], 7);
        assert_eq!(json["alertType"], "fire");
        assert_eq!(json["sessionKey"], "abc");
        assert_eq!(json["status"], "pending");
    }
}
