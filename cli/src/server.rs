use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer};
use tracing::{error, info};

use stride_core::aggregate::DailyBurn;
use stride_core::calendar::{Clock, DAY_FORMAT, SystemClock};
use stride_core::models::{
    Goals, GoalsPatch, MealEvent, NewMeal, NewWorkout, ScalarKind, Snapshot, User, UserPatch,
    WorkoutEvent, validate_goals_patch, validate_new_meal, validate_new_workout,
    validate_user_patch,
};
use stride_core::service::{FitnessService, Refusal};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<Mutex<FitnessService>>,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub(crate) fn new(service: Arc<Mutex<FitnessService>>, clock: Arc<dyn Clock>) -> Self {
        Self { service, clock }
    }

    fn service(&self) -> MutexGuard<'_, FitnessService> {
        self.service
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct WaterRequest {
    amount: u32,
    date: Option<String>,
}

#[derive(Deserialize)]
struct StepsRequest {
    steps: u32,
    date: Option<String>,
}

#[derive(Serialize)]
struct WaterResponse {
    water_ml: u32,
    date: NaiveDate,
}

#[derive(Serialize)]
struct StepsResponse {
    steps: u32,
    date: NaiveDate,
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err}"))
}

/// Map a service error, keeping refusals out of the 500 path.
fn service_error(err: anyhow::Error, context: &'static str) -> ApiError {
    match err.downcast_ref::<Refusal>() {
        Some(Refusal::NameRequired) => bad_request(&err),
        Some(Refusal::NoUser) => ApiError::NotFound("User not found".to_string()),
        None => ApiError::Internal(err.context(context)),
    }
}

fn parse_optional_date(date: Option<&str>) -> Result<Option<NaiveDate>, ApiError> {
    date.map(|d| {
        NaiveDate::parse_from_str(d, DAY_FORMAT)
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{d}'. Use YYYY-MM-DD")))
    })
    .transpose()
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn get_data(State(state): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    let today = state.clock.today();
    let snapshot = state.service().snapshot(today).context("database error")?;
    Ok(Json(snapshot))
}

async fn save_user(
    State(state): State<AppState>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, ApiError> {
    validate_user_patch(&patch).map_err(|e| bad_request(&e))?;

    let user = state
        .service()
        .save_user(&patch)
        .map_err(|e| service_error(e, "failed to save user"))?;
    Ok(Json(user))
}

async fn save_goals(
    State(state): State<AppState>,
    Json(patch): Json<GoalsPatch>,
) -> Result<Json<Goals>, ApiError> {
    validate_goals_patch(&patch).map_err(|e| bad_request(&e))?;

    let goals = state
        .service()
        .save_goals(&patch)
        .map_err(|e| service_error(e, "failed to save goals"))?;
    Ok(Json(goals))
}

async fn create_workout(
    State(state): State<AppState>,
    Json(req): Json<NewWorkout>,
) -> Result<(StatusCode, Json<WorkoutEvent>), ApiError> {
    validate_new_workout(&req).map_err(|e| bad_request(&e))?;

    let now = state.clock.now();
    let workout = state
        .service()
        .log_workout(&req, now)
        .context("failed to insert workout")?;
    Ok((StatusCode::CREATED, Json(workout)))
}

async fn delete_workout(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if state
        .service()
        .delete_workout(&id)
        .context("database error")?
    {
        Ok(Json(DeleteResponse { success: true }))
    } else {
        Err(ApiError::NotFound(format!("Workout {id} not found")))
    }
}

async fn create_meal(
    State(state): State<AppState>,
    Json(req): Json<NewMeal>,
) -> Result<(StatusCode, Json<MealEvent>), ApiError> {
    validate_new_meal(&req).map_err(|e| bad_request(&e))?;

    let now = state.clock.now();
    let meal = state
        .service()
        .log_meal(&req, now)
        .context("failed to insert meal")?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if state.service().delete_meal(&id).context("database error")? {
        Ok(Json(DeleteResponse { success: true }))
    } else {
        Err(ApiError::NotFound(format!("Meal {id} not found")))
    }
}

async fn set_water(
    State(state): State<AppState>,
    Json(req): Json<WaterRequest>,
) -> Result<Json<WaterResponse>, ApiError> {
    let date = parse_optional_date(req.date.as_deref())?;
    let today = state.clock.today();
    let ack = state
        .service()
        .set_scalar(ScalarKind::Water, date, req.amount, today)
        .context("failed to save water intake")?;
    Ok(Json(WaterResponse {
        water_ml: ack.value,
        date: ack.date,
    }))
}

async fn set_steps(
    State(state): State<AppState>,
    Json(req): Json<StepsRequest>,
) -> Result<Json<StepsResponse>, ApiError> {
    let date = parse_optional_date(req.date.as_deref())?;
    let today = state.clock.today();
    let ack = state
        .service()
        .set_scalar(ScalarKind::Steps, date, req.steps, today)
        .context("failed to save steps")?;
    Ok(Json(StepsResponse {
        steps: ack.value,
        date: ack.date,
    }))
}

async fn chart_data(State(state): State<AppState>) -> Result<Json<Vec<DailyBurn>>, ApiError> {
    let today = state.clock.today();
    let trend = state
        .service()
        .calories_burned_trend(today)
        .context("failed to build chart data")?;
    Ok(Json(trend))
}

// --- Router ---

pub(crate) fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/data", get(get_data))
        .route("/api/user", post(save_user))
        .route("/api/goals", post(save_goals))
        .route("/api/workouts", post(create_workout))
        .route("/api/workouts/{id}", delete(delete_workout))
        .route("/api/meals", post(create_meal))
        .route("/api/meals/{id}", delete(delete_meal))
        .route("/api/water", post(set_water))
        .route("/api/steps", post(set_steps))
        .route("/api/chart-data", get(chart_data))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(service: FitnessService, port: u16, bind: &str) -> anyhow::Result<()> {
    let state = AppState::new(Arc::new(Mutex::new(service)), Arc::new(SystemClock));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
