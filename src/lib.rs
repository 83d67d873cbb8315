pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod monitor;
pub mod security;
pub mod services;
pub mod utils;

// Re-export main components for easier use
pub use error::Error;
pub use monitor::{AlertSessionCoordinator, DetectionClient, FrameSampler, Monitor, MonitorContext, TriggerType};
pub use services::{AlertHistory, EvidenceFiles, EvidenceSink};
