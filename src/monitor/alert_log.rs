use super::detection::TriggerType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Recording,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertLogEntry {
    pub session_id: String,
    pub trigger: TriggerType,
    pub started_at: DateTime<Utc>,
    pub message: String,
    pub status: LogStatus,
}

/// Sessions kept in the log; older ones fall off the end
pub const MAX_ENTRIES: usize = 100;

/// Operator-facing record of alert sessions, newest first
#[derive(Debug, Clone, Default)]
pub struct AlertLog {
    entries: Arc<Mutex<Vec<AlertLogEntry>>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AlertLogEntry>> {
        // Entries stay consistent even if a writer panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn begin(&self, session_id: &str, trigger: TriggerType, started_at: DateTime<Utc>) {
        let mut entries = self.lock();
        entries.insert(
            0,
            AlertLogEntry {
                session_id: session_id.to_string(),
                trigger,
                started_at,
                message: format!("{} detected, recording evidence", trigger),
                status: LogStatus::Recording,
            },
        );
        entries.truncate(MAX_ENTRIES);
    }

    /// Mark a session done. Returns false for unknown sessions.
    pub fn complete(&self, session_id: &str) -> bool {
        let mut entries = self.lock();
        match entries.iter_mut().find(|e| e.session_id == session_id) {
            Some(entry) => {
                entry.status = LogStatus::Done;
                entry.message = "Evidence saved!".to_string();
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> Vec<AlertLogEntry> {
        self.lock().clone()
    }

    pub fn status(&self, session_id: &str) -> Option<LogStatus> {
        self.lock()
            .iter()
            .find(|e| e.session_id == session_id)
            .map(|e| e.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_first_and_completion() {
        let log = AlertLog::new();
        log.begin("a", TriggerType::Fire, Utc::now());
        log.begin("b", TriggerType::Fall, Utc::now());

        let entries = log.entries();
        assert_eq!(entries[0].session_id, "b");
        assert_eq!(entries[1].status, LogStatus::Recording);

        assert!(log.complete("a"));
        assert_eq!(log.status("a"), Some(LogStatus::Done));
        assert_eq!(log.entries()[1].message, "Evidence saved!");
        assert_eq!(log.entries()[0].message, "FALL detected, recording evidence");
        assert_eq!(log.status("b"), Some(LogStatus::Recording));
        assert!(!log.complete("zzz"));
    }

    #[test]
    fn oldest_sessions_fall_off() {
        let log = AlertLog::new();
        for i in 0..MAX_ENTRIES + 5 {
            log.begin(&format!("s{}", i), TriggerType::Fire, Utc::now());
        }

        let entries = log.entries();
        assert_eq!(entries.len(), MAX_ENTRIES);
        assert_eq!(entries[0].session_id, format!("s{}", MAX_ENTRIES + 4));
        assert_eq!(log.status("s0"), None);
        assert!(!log.complete("s4"));
    }
}
