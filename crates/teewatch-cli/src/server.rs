use axum::extract::{MatchedPath, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use teewatch_core::{AlertEngine, SnapshotHolder};
use teewatch_models::time_format::format_timestamp;
use teewatch_models::{TeeTimeRecord, WatchEntry};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared with the poll loop
#[derive(Clone)]
pub struct AppState {
    pub snapshots: Arc<SnapshotHolder>,
    pub alerts: Arc<AlertEngine>,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("course '{0}' is not watched")]
    NotWatched(String),

    #[error("course_name cannot be empty")]
    EmptyCourseName,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            message: String,
        }

        let status = match &self {
            RouteError::NotWatched(_) => StatusCode::NOT_FOUND,
            RouteError::EmptyCourseName => StatusCode::BAD_REQUEST,
        };
        warn!(status = %status, error = %self, "Request rejected");
        (status, Json(ErrorResponse { message: self.to_string() })).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub last_update: Option<String>,
    pub records: usize,
    pub watched: usize,
}

#[derive(Debug, Deserialize)]
pub struct WatchRequest {
    pub course_name: String,
    #[serde(default)]
    pub play_date: Option<NaiveDate>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/golf-data", get(golf_data))
        .route("/api/status", get(status))
        .route("/api/watch", get(list_watches).post(add_watch))
        .route("/api/watch/{course}", delete(remove_watch))
        .route("/checkhealth", get(|| async { "OK" }))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();
                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn serve(addr: SocketAddr, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!(server_url = %format!("http://{}", addr), "HTTP publisher ready");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP publisher stopped");
    Ok(())
}

async fn golf_data(State(state): State<AppState>) -> Json<Vec<TeeTimeRecord>> {
    Json(state.snapshots.latest().records.clone())
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.snapshots.latest();
    Json(StatusResponse {
        last_update: snapshot.updated_at.as_ref().map(format_timestamp),
        records: snapshot.len(),
        watched: state.alerts.len(),
    })
}

async fn list_watches(State(state): State<AppState>) -> Json<Vec<WatchEntry>> {
    Json(state.alerts.watch_entries())
}

async fn add_watch(
    State(state): State<AppState>,
    Json(request): Json<WatchRequest>,
) -> Result<(StatusCode, Json<WatchEntry>), RouteError> {
    let course_name = request.course_name.trim();
    if course_name.is_empty() {
        return Err(RouteError::EmptyCourseName);
    }

    let entry = state.alerts.subscribe_from_snapshot(
        course_name,
        request.play_date,
        &state.snapshots.latest(),
        Local::now().date_naive(),
    );
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_watch(State(state): State<AppState>, Path(course): Path<String>) -> Result<StatusCode, RouteError> {
    if state.alerts.unsubscribe(&course) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(RouteError::NotWatched(course))
    }
}
