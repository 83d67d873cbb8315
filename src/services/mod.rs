pub mod alert_history;
pub mod evidence_files;
pub mod evidence_sink;

pub use alert_history::AlertHistory;
pub use evidence_files::{EvidenceFiles, StoredFile};
pub use evidence_sink::{EvidenceReceipt, EvidenceSink, EvidenceUploadRequest, LooseId};
