use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Json, Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use voyage_agents::TravelPlanner;
use voyage_core::{ItineraryRequest, NewExpense, PlannerError, PromptBuilder};
use voyage_llm::{CompletionBackend, CompletionTimeouts, LlmSettings};
use voyage_observability::{AppMetrics, MetricsSnapshot};
use voyage_storage::Store;

pub type Planner = TravelPlanner<Store, CompletionBackend>;

#[derive(Clone)]
pub struct ApiState {
    pub planner: Arc<Planner>,
    pub metrics: Arc<AppMetrics>,
    pub completion_backend: &'static str,
    pub completion_configured: bool,
    pub storage_backend: &'static str,
    pub allowed_origins: Arc<Vec<String>>,
}

impl ApiState {
    pub fn new(
        store: Store,
        backend: CompletionBackend,
        timeouts: CompletionTimeouts,
        allowed_origins: Vec<String>,
    ) -> Self {
        let metrics = AppMetrics::shared();
        let completion_backend = backend.name();
        let completion_configured = backend.is_configured();
        let storage_backend = store.backend();

        let planner = Arc::new(TravelPlanner::new(
            Arc::new(store),
            Arc::new(backend),
            PromptBuilder::default(),
            timeouts,
            metrics.clone(),
        ));

        Self {
            planner,
            metrics,
            completion_backend,
            completion_configured,
            storage_backend,
            allowed_origins: Arc::new(allowed_origins),
        }
    }
}

pub async fn build_app() -> Result<Router> {
    let settings = LlmSettings::from_env();
    if settings.api_key.is_none() {
        tracing::warn!("DASHSCOPE_API_KEY is not set, extraction endpoints will fail");
    }
    let backend =
        CompletionBackend::from_settings(settings).context("failed to build completion client")?;

    let database_url = env::var("VOYAGE_DATABASE_URL").ok();
    let store = Store::from_url(database_url.as_deref()).await?;

    let state = ApiState::new(
        store,
        backend,
        CompletionTimeouts::from_env(),
        parse_allowed_origins(),
    );
    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/itinerary/generate", post(itinerary_generate))
        .route("/api/itinerary/list", get(itinerary_list))
        .route("/api/itinerary/:trip_id", get(itinerary_get))
        .route("/api/budget/add", post(budget_add))
        .route("/api/budget/list", get(budget_list))
        .route("/api/budget/summary", get(budget_summary))
        .route("/api/budget/ai-extract", post(budget_ai_extract))
        .route("/api/budget/analysis", post(budget_analysis))
        .route("/api/text/parse", post(text_parse))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: MetricsSnapshot,
    completion: CompletionHealth,
    storage: &'static str,
}

#[derive(Debug, Serialize)]
struct CompletionHealth {
    backend: &'static str,
    configured: bool,
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        completion: CompletionHealth {
            backend: state.completion_backend,
            configured: state.completion_configured,
        },
        storage: state.storage_backend,
    };
    (StatusCode::OK, Json(payload))
}

#[derive(Debug, Deserialize)]
struct TripQuery {
    trip_id: String,
}

#[derive(Debug, Deserialize)]
struct TextInput {
    text: String,
}

#[derive(Debug, Deserialize)]
struct TripInfoInput {
    text: String,
    #[serde(default)]
    reference_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct AnalysisInput {
    trip_id: String,
}

async fn itinerary_generate(
    State(state): State<ApiState>,
    Json(input): Json<ItineraryRequest>,
) -> Response {
    match state.planner.generate_itinerary(input).await {
        Ok(generated) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "trip_id": generated.record.id,
                "status": generated.record.status,
                "duration_days": generated.record.duration_days(),
                "parse_stage": generated.parse_stage,
                "trip": generated.record,
            })),
        )
            .into_response(),
        Err(err) => planner_error(err),
    }
}

async fn itinerary_list(State(state): State<ApiState>) -> Response {
    match state.planner.list_trips().await {
        Ok(trips) => (StatusCode::OK, Json(trips)).into_response(),
        Err(err) => planner_error(err),
    }
}

async fn itinerary_get(State(state): State<ApiState>, Path(trip_id): Path<String>) -> Response {
    match state.planner.get_trip(&trip_id).await {
        Ok(trip) => (StatusCode::OK, Json(trip)).into_response(),
        Err(err) => planner_error(err),
    }
}

async fn budget_add(State(state): State<ApiState>, Json(input): Json<NewExpense>) -> Response {
    match state.planner.add_expense(input).await {
        Ok(expense) => (StatusCode::OK, Json(expense)).into_response(),
        Err(err) => planner_error(err),
    }
}

async fn budget_list(State(state): State<ApiState>, Query(query): Query<TripQuery>) -> Response {
    match state.planner.list_expenses(&query.trip_id).await {
        Ok(expenses) => (StatusCode::OK, Json(expenses)).into_response(),
        Err(err) => planner_error(err),
    }
}

async fn budget_summary(
    State(state): State<ApiState>,
    Query(query): Query<TripQuery>,
) -> Response {
    match state.planner.budget_summary(&query.trip_id).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => planner_error(err),
    }
}

async fn budget_ai_extract(
    State(state): State<ApiState>,
    Json(input): Json<TextInput>,
) -> Response {
    match state.planner.extract_expense(&input.text).await {
        Ok(extraction) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "expense": extraction.record,
                "parse_stage": extraction.parse_stage,
            })),
        )
            .into_response(),
        Err(err) => planner_error(err),
    }
}

async fn budget_analysis(
    State(state): State<ApiState>,
    Json(input): Json<AnalysisInput>,
) -> Response {
    match state.planner.analyze_budget(&input.trip_id).await {
        Ok(extraction) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "analysis": extraction.record.analysis,
                "suggestions": extraction.record.suggestions,
                "parse_stage": extraction.parse_stage,
            })),
        )
            .into_response(),
        Err(err) => planner_error(err),
    }
}

async fn text_parse(State(state): State<ApiState>, Json(input): Json<TripInfoInput>) -> Response {
    match state
        .planner
        .parse_trip_info(&input.text, input.reference_date)
        .await
    {
        Ok(extraction) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "trip_info": extraction.record,
                "parse_stage": extraction.parse_stage,
            })),
        )
            .into_response(),
        Err(err) => planner_error(err),
    }
}

fn planner_error(err: PlannerError) -> Response {
    let status = match &err {
        PlannerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PlannerError::NotFound(_) => StatusCode::NOT_FOUND,
        PlannerError::Upstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(kind = err.kind(), error = %err, "request failed");
    }

    (
        status,
        Json(serde_json::json!({
            "error": err.kind(),
            "message": err.to_string()
        })),
    )
        .into_response()
}

fn parse_allowed_origins() -> Vec<String> {
    env::var("VOYAGE_ALLOWED_ORIGINS")
        .ok()
        .map(|value| {
            value
                .split(',')
                .map(|origin| origin.trim().trim_end_matches('/').to_string())
                .filter(|origin| !origin.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_else(|| vec!["http://localhost:5173".to_string()])
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();
    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:5173")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}
