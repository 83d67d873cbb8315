pub mod alert_models;

pub use alert_models::{
    Alert, AlertDetail, AlertEvidence, AlertStatus, AlertType, NewAlert, NewEvidence,
};
