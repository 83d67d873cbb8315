use crate::config::ApiConfig;
use crate::db::DatabaseService;
use crate::error::Error;
use crate::security::SecurityService;
use crate::services::{AlertHistory, EvidenceFiles, EvidenceSink};
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::info;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

pub mod alerts_controller;
pub mod detect_controller;
pub mod evidence_controller;

pub use detect_controller::DetectProxy;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<EvidenceSink>,
    pub history: Arc<AlertHistory>,
    pub security: Arc<SecurityService>,
    pub detect: Arc<DetectProxy>,
    /// Absent when alerts are kept in memory
    pub database: Option<Arc<DatabaseService>>,
}

impl FromRef<AppState> for Arc<SecurityService> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.security)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        ApiError {
            message: err.to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    db_healthy: bool,
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let db_healthy = match &state.database {
        Some(database) => database.health_check().await?,
        None => true,
    };

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
    }))
}

/// Build the API router: evidence intake, the detection relay, alert history
/// and the static evidence image directory.
pub fn router(state: AppState, files: &EvidenceFiles, body_limit_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    let uploads_route = format!("/{}", files.url_prefix());

    Router::new()
        .route("/api/health", get(health))
        // Evidence intake is unauthenticated: the capture client posts here directly
        .route(
            "/api/alerts/evidence",
            post(evidence_controller::receive_evidence),
        )
        .route("/api/detect_frame", post(detect_controller::detect_frame))
        .route("/api/alerts", get(alerts_controller::get_alerts))
        .route(
            "/api/alerts/:id",
            get(alerts_controller::get_alert_detail).delete(alerts_controller::delete_alert),
        )
        .nest_service(&uploads_route, ServeDir::new(files.root()))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(cors)
        .with_state(state)
}

pub struct RestApi {
    config: ApiConfig,
    state: AppState,
    files: EvidenceFiles,
}

impl RestApi {
    pub fn new(config: &ApiConfig, state: AppState, files: EvidenceFiles) -> Self {
        Self {
            config: config.clone(),
            state,
            files,
        }
    }

    /// Serve until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let app = router(
            self.state.clone(),
            &self.files,
            self.config.body_limit_mb * 1024 * 1024,
        );

        let addr = self.config.address.clone() + ":" + &self.config.port.to_string();
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid API address {}: {}", addr, e)))?;

        info!("API server listening on {}", addr);

        axum::Server::try_bind(&addr)?
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
