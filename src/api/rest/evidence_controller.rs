use crate::api::rest::{ApiResult, AppState};
use crate::services::EvidenceUploadRequest;
use axum::extract::State;
use axum::Json;
use log::warn;
use serde::Serialize;

/// Response for an accepted evidence upload
#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub ok: bool,
    #[serde(rename = "alertID")]
    pub alert_id: i64,
    pub saved: String,
}

/// `POST /api/alerts/evidence`
pub async fn receive_evidence(
    State(state): State<AppState>,
    Json(request): Json<EvidenceUploadRequest>,
) -> ApiResult<Json<EvidenceResponse>> {
    let receipt = state.sink.receive(request).await.map_err(|e| {
        warn!("Rejected evidence upload: {}", e);
        e
    })?;

    Ok(Json(EvidenceResponse {
        ok: true,
        alert_id: receipt.alert_id,
        saved: receipt.saved,
    }))
}
