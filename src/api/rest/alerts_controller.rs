use crate::api::rest::{ApiResult, AppState};
use crate::db::models::{Alert, AlertDetail};
use crate::security::AuthUser;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub ok: bool,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize)]
pub struct AlertDetailResponse {
    pub ok: bool,
    pub alert: AlertDetail,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub message: String,
}

/// `GET /api/alerts`
pub async fn get_alerts(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<AlertListResponse>> {
    let alerts = state.history.list(user.user_id).await?;
    Ok(Json(AlertListResponse { ok: true, alerts }))
}

/// `GET /api/alerts/:id`
pub async fn get_alert_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertDetailResponse>> {
    let alert = state.history.detail(user.user_id, id).await?;
    Ok(Json(AlertDetailResponse { ok: true, alert }))
}

/// `DELETE /api/alerts/:id`
pub async fn delete_alert(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    state.history.delete(user.user_id, id).await?;
    Ok(Json(DeleteResponse {
        ok: true,
        message: "Alert deleted successfully".to_string(),
    }))
}
