use crate::config::GatewayConfig;
use crate::hub::TelemetryHub;
use crate::metrics::gather_metrics;
use crate::model::OutboundMessage;
use crate::ws::ws_telemetry;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct AppState {
    pub hub: Arc<TelemetryHub>,
    pub config: Arc<GatewayConfig>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    mapbox_public_token: String,
    app_settings: AppSettingsResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppSettingsResponse {
    api_url: String,
    user_token: String,
    project_uuid: String,
    workflow_uuid: String,
    creator_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    sn: String,
}

#[derive(Debug, Serialize)]
struct StreamResponse {
    sn: String,
    url: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    let frontend = state.config.frontend_dir.clone();

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/state", get(api_state))
        .route("/api/config", get(api_config))
        .route("/api/stream", get(api_stream))
        .route("/ws/telemetry", get(ws_telemetry))
        .route("/metrics", get(metrics))
        .with_state(state);

    let router = if frontend.is_dir() {
        info!("Serving frontend from {}", frontend.display());
        let index = frontend.join("index.html");
        router.fallback_service(ServeDir::new(&frontend).fallback(ServeFile::new(index)))
    } else {
        router
    };

    router.layer(CorsLayer::permissive())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        time: Utc::now(),
    })
}

async fn api_state(State(state): State<AppState>) -> Json<OutboundMessage> {
    Json(state.hub.snapshot_message().await)
}

async fn api_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let settings = &state.config.app_settings;
    Json(ConfigResponse {
        mapbox_public_token: state.config.mapbox_public_token.clone(),
        app_settings: AppSettingsResponse {
            api_url: settings.api_url.clone(),
            user_token: settings.user_token.clone(),
            project_uuid: settings.project_uuid.clone(),
            workflow_uuid: settings.workflow_uuid.clone(),
            creator_id: settings.creator_id.clone(),
        },
    })
}

async fn api_stream(
    State(state): State<AppState>,
    Query(params): Query<StreamQuery>,
) -> Json<StreamResponse> {
    let url = state.config.stream_urls.get(&params.sn).cloned();
    Json(StreamResponse { sn: params.sn, url })
}

async fn metrics() -> Result<String, AppError> {
    Ok(gather_metrics()?)
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
