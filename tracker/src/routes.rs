use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use justrun_data_management::step_cache::DailySteps;
use justrun_lib::{daily_stats::{DailyStat, JogTotals}, jog::Jog, position::RawSample};
use serde::{Deserialize, Serialize};

use crate::{controller::SessionReadout, error::TrackingError, platform::LocationError, server_state::ServerState};

const DEFAULT_STATS_DAYS: u32 = 7;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/tracking", get(get_readout))
        .route("/tracking/position", get(get_position))
        .route("/tracking/start", post(start))
        .route("/tracking/stop", post(stop))
        .route("/tracking/save", post(save))
        .route("/tracking/discard", post(discard))
        .route("/tracking/sample", post(post_sample))
        .route("/tracking/location_error", post(post_location_error))
        .route("/jogs", get(get_jogs))
        .route("/jogs/totals", get(get_totals))
        .route("/stats/daily", get(get_daily_stats))
        .route("/stats/streak", get(get_streak))
        .route("/steps", get(get_steps).post(post_steps))
        .with_state(state)
}

pub enum ApiError {
    Tracking(TrackingError),
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<TrackingError> for ApiError {
    fn from(error: TrackingError) -> Self {
        ApiError::Tracking(error)
    }
}

impl From<justrun_data_management::DataManagerError> for ApiError {
    fn from(error: justrun_data_management::DataManagerError) -> Self {
        ApiError::Internal(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Tracking(error) => {
                let status = match error {
                    TrackingError::CapabilityUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    TrackingError::PermissionDenied => StatusCode::FORBIDDEN,
                    TrackingError::SignalDegraded(_) => StatusCode::SERVICE_UNAVAILABLE,
                    TrackingError::InsufficientData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    TrackingError::SaveFailed(_) => StatusCode::BAD_GATEWAY,
                    TrackingError::InvalidTransition { .. } => StatusCode::CONFLICT,
                    TrackingError::TrackerGone => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, error.to_string())
            }
            ApiError::Internal(error) => {
                tracing::error!("Request failed: {error:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn get_readout(State(state): State<Arc<ServerState>>) -> ApiResult<SessionReadout> {
    Ok(Json(state.tracker.readout().await?))
}

async fn get_position(State(state): State<Arc<ServerState>>) -> ApiResult<RawSample> {
    Ok(Json(state.tracker.locate().await?))
}

async fn start(State(state): State<Arc<ServerState>>) -> ApiResult<SessionReadout> {
    Ok(Json(state.tracker.start().await?))
}

async fn stop(State(state): State<Arc<ServerState>>) -> ApiResult<SessionReadout> {
    Ok(Json(state.tracker.stop().await?))
}

async fn save(State(state): State<Arc<ServerState>>) -> ApiResult<Jog> {
    Ok(Json(state.tracker.save().await?))
}

async fn discard(State(state): State<Arc<ServerState>>) -> ApiResult<SessionReadout> {
    Ok(Json(state.tracker.discard().await?))
}

async fn post_sample(State(state): State<Arc<ServerState>>, Json(sample): Json<RawSample>) -> Result<StatusCode, ApiError> {
    state.fixes.push(sample);
    state.tracker.send_sample(sample).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
struct LocationErrorBody {
    kind: LocationError,
}

async fn post_location_error(State(state): State<Arc<ServerState>>, Json(body): Json<LocationErrorBody>) -> Result<StatusCode, ApiError> {
    state.tracker.report_error(body.kind).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn get_jogs(State(state): State<Arc<ServerState>>) -> ApiResult<Vec<Jog>> {
    Ok(Json(state.data_manager.get_jogs(&state.user_id).await?))
}

async fn get_totals(State(state): State<Arc<ServerState>>) -> ApiResult<JogTotals> {
    Ok(Json(state.data_manager.jog_totals(&state.user_id).await?))
}

#[derive(Deserialize)]
struct StatsQuery {
    days: Option<u32>,
}

async fn get_daily_stats(State(state): State<Arc<ServerState>>, Query(query): Query<StatsQuery>) -> ApiResult<Vec<DailyStat>> {
    let days = query.days.unwrap_or(DEFAULT_STATS_DAYS);
    let today = Utc::now().date_naive();
    Ok(Json(state.data_manager.get_daily_stats(&state.user_id, days, today).await?))
}

#[derive(Serialize)]
struct StreakBody {
    streak: u32,
}

async fn get_streak(State(state): State<Arc<ServerState>>) -> ApiResult<StreakBody> {
    let streak = state.data_manager.current_streak(&state.user_id, Utc::now().date_naive()).await?;
    Ok(Json(StreakBody { streak }))
}

async fn get_steps(State(state): State<Arc<ServerState>>) -> ApiResult<DailySteps> {
    let mut cache = state.step_cache.lock().await;
    Ok(Json(cache.load(Utc::now().date_naive())?))
}

#[derive(Deserialize)]
struct StepsBody {
    steps: u64,
}

async fn post_steps(State(state): State<Arc<ServerState>>, Json(body): Json<StepsBody>) -> ApiResult<DailySteps> {
    let mut cache = state.step_cache.lock().await;
    Ok(Json(cache.add_steps(Utc::now().date_naive(), body.steps)?))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use justrun_data_management::{local_store::{FileStore, MemoryStore}, session_store::SessionPersistence, step_cache::DailyStepCache, DataManager};
    use justrun_lib::{clock::SystemClock, position::Position};
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    use super::*;
    use crate::{actor::spawn_tracker, controller::ControllerSettings, jog_store::LocalJogStore, runtime::{FixFeed, PushLocationProvider}};

    async fn app(dir: &std::path::Path) -> Router {
        let data_manager = DataManager::in_memory().await.unwrap();
        let fixes = FixFeed::new();
        let (tracker, _task) = spawn_tracker(
            PushLocationProvider::new(fixes.clone()),
            SessionPersistence::new(MemoryStore::new(), SystemClock),
            ControllerSettings::default(),
            LocalJogStore::new(data_manager.clone(), "runner"),
        );

        router(Arc::new(ServerState {
            tracker,
            fixes,
            data_manager,
            step_cache: Mutex::new(DailyStepCache::new(FileStore::open(dir).unwrap())),
            user_id: "runner".to_string(),
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|value| Body::from(value.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    fn sample_json(latitude: f64) -> serde_json::Value {
        serde_json::to_value(RawSample::new(Position::new(latitude, 9.0), 7.0, Utc::now())).unwrap()
    }

    #[tokio::test]
    async fn record_and_save_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, body) = call(&app, "POST", "/tracking/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "active");

        for latitude in [56.0, 56.0003, 56.0006] {
            let (status, _) = call(&app, "POST", "/tracking/sample", Some(sample_json(latitude))).await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }

        let (_, body) = call(&app, "GET", "/tracking", None).await;
        assert_eq!(body["route"].as_array().unwrap().len(), 3);
        assert_eq!(body["route"][0]["lat"], 56.0);

        let (status, _) = call(&app, "POST", "/tracking/save", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        call(&app, "POST", "/tracking/stop", None).await;
        let (status, jog) = call(&app, "POST", "/tracking/save", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(jog["user_id"], "runner");

        let (_, jogs) = call(&app, "GET", "/jogs", None).await;
        assert_eq!(jogs.as_array().unwrap().len(), 1);

        let (_, totals) = call(&app, "GET", "/jogs/totals", None).await;
        assert_eq!(totals["total_jogs"], 1);

        let (_, streak) = call(&app, "GET", "/stats/streak", None).await;
        assert_eq!(streak["streak"], 1);

        let (_, stats) = call(&app, "GET", "/stats/daily?days=3", None).await;
        assert_eq!(stats[0]["jogs_count"], 1);
    }

    #[tokio::test]
    async fn insufficient_data_maps_to_422() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        call(&app, "POST", "/tracking/start", None).await;
        call(&app, "POST", "/tracking/sample", Some(sample_json(56.0))).await;
        call(&app, "POST", "/tracking/stop", None).await;

        let (status, body) = call(&app, "POST", "/tracking/save", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("at least 2"));
    }

    #[tokio::test]
    async fn permission_denied_stops_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        call(&app, "POST", "/tracking/start", None).await;
        let (status, _) = call(&app, "POST", "/tracking/location_error", Some(serde_json::json!({"kind": "permission_denied"}))).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = call(&app, "GET", "/tracking", None).await;
        assert_eq!(body["status"], "stopped");
        assert_eq!(body["last_error"], "location permission was denied");
    }

    #[tokio::test]
    async fn position_and_steps() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path()).await;

        let (status, _) = call(&app, "GET", "/tracking/position", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        call(&app, "POST", "/tracking/sample", Some(sample_json(56.0))).await;
        let (status, fix) = call(&app, "GET", "/tracking/position", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fix["position"]["lat"], 56.0);

        call(&app, "POST", "/steps", Some(serde_json::json!({"steps": 400}))).await;
        let (_, steps) = call(&app, "POST", "/steps", Some(serde_json::json!({"steps": 100}))).await;
        assert_eq!(steps["steps"], 500);

        let (_, steps) = call(&app, "GET", "/steps", None).await;
        assert_eq!(steps["steps"], 500);
    }
}
