mod auth;
mod metrics;
mod middleware;

use std::convert::Infallible;
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, routing::post, Json, Router};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tessera_core::{Citation, UserContext};
use tessera_rag::{Pipeline, QueryRequest, RagConfig, RagError, ServedAnswer};

use crate::auth::UserDirectory;
use crate::metrics::ServiceMetrics;

const API_KEY_HEADER: &str = "x-api-key";

/// Settings that only the HTTP surface reads.
#[derive(Debug, Clone, Default)]
struct ServiceOptions {
    cors_origins: Vec<String>,
    streaming: bool,
}

impl ServiceOptions {
    fn from_env() -> Self {
        let cors_origins = env::var("TESSERA_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let streaming = env::var("TESSERA_ENABLE_STREAMING")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        Self {
            cors_origins,
            streaming,
        }
    }
}

struct AppState {
    pipeline: Pipeline,
    users: UserDirectory,
    metrics: Arc<ServiceMetrics>,
    options: ServiceOptions,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let config = RagConfig::load()?;
    let pipeline = Pipeline::from_config(&config)?;
    let users = match env::var("TESSERA_USERS") {
        Ok(path) => UserDirectory::from_file(Path::new(&path))?,
        Err(_) => {
            warn!("TESSERA_USERS is not set, every query will be rejected");
            UserDirectory::default()
        }
    };
    info!(users = users.len(), "user_directory_loaded");
    let options = ServiceOptions::from_env();
    info!(
        cors_origins = options.cors_origins.len(),
        streaming = options.streaming,
        "service_options"
    );
    let state = Arc::new(AppState {
        pipeline,
        users,
        metrics: Arc::new(ServiceMetrics::new()),
        options,
    });
    let app = router(state);
    let addr: SocketAddr = env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/query", post(handle_query))
        .route("/chat/stream", get(handle_stream))
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/metrics", get(handle_metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.metrics.clone(),
            middleware::track_requests,
        ))
        .layer(middleware::cors(&state.options.cors_origins, API_KEY_HEADER));
    for layer in middleware::security_headers() {
        app = app.layer(layer);
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Tenant scope is never read from the body; unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    regulatory_strict: Option<bool>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    answer: String,
    used_chunks: Vec<String>,
    citations: Vec<Citation>,
    session_id: String,
    max_pii_sensitivity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: String,
    provider_ok: bool,
}

fn authenticate<'a>(
    state: &'a AppState,
    headers: &HeaderMap,
) -> Result<(&'a UserContext, String), AppError> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AppError::Unauthorized)?;
    let user = state.users.resolve(api_key).ok_or(AppError::Unauthorized)?;
    Ok((user, api_key.to_string()))
}

async fn serve_timed(
    state: &AppState,
    user: &UserContext,
    request: &QueryRequest,
) -> Result<ServedAnswer, AppError> {
    let started = Instant::now();
    let served = state.pipeline.serve(user, request).await?;
    state
        .metrics
        .observe_query(started.elapsed(), served.answer.used_chunk_ids.len());
    Ok(served)
}

async fn handle_query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, AppError> {
    let (user, api_key) = authenticate(&state, &headers)?;
    let request = QueryRequest {
        query: body.query,
        session_id: body.session_id,
        api_key: Some(api_key),
        regulatory_strict: body.regulatory_strict,
    };
    let served = serve_timed(&state, user, &request).await?;
    let answer = served.answer;
    Ok(Json(QueryResponse {
        answer: answer.answer_text,
        used_chunks: answer.used_chunk_ids,
        citations: answer.citations,
        session_id: served.session_id,
        max_pii_sensitivity: answer.max_pii_sensitivity.map(String::from),
    }))
}

/// The gated answer as one SSE `data` event per whitespace-separated token.
async fn handle_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if !state.options.streaming {
        return Err(AppError::StreamingDisabled);
    }
    let (user, api_key) = authenticate(&state, &headers)?;
    let request = QueryRequest {
        query: params.q,
        session_id: params.session_id,
        api_key: Some(api_key),
        regulatory_strict: None,
    };
    let served = serve_timed(&state, user, &request).await?;
    let tokens: Vec<String> = served
        .answer
        .answer_text
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let events = stream::iter(
        tokens
            .into_iter()
            .map(|token| Ok::<_, Infallible>(Event::default().data(token))),
    );
    Ok(Sse::new(events))
}

async fn handle_version() -> Json<serde_json::Value> {
    Json(json!({
        "app_version": env!("CARGO_PKG_VERSION"),
        "git_sha": option_env!("TESSERA_GIT_SHA").unwrap_or("unknown"),
        "build_time": option_env!("TESSERA_BUILD_TIME").unwrap_or("unknown"),
    }))
}

async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, metrics::CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            error!("metrics_encode_failed" = %err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let generator = state.pipeline.orchestrator().generator();
    Json(HealthResponse {
        status: "ok",
        provider: generator.name().to_string(),
        provider_ok: generator.health().await,
    })
}

#[derive(Debug, Error)]
enum AppError {
    #[error("missing or unknown api key")]
    Unauthorized,
    #[error("streaming is disabled")]
    StreamingDisabled,
    #[error(transparent)]
    Rag(#[from] RagError),
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unauthorized => detail(StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::StreamingDisabled => detail(StatusCode::NOT_FOUND, "streaming disabled"),
            AppError::Rag(RagError::AdmissionDenied { retry_after_secs }) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                Json(json!({ "detail": "rate_limited" })),
            )
                .into_response(),
            AppError::Rag(RagError::NoTenantScope) => {
                detail(StatusCode::FORBIDDEN, "no customer scope assigned")
            }
            AppError::Rag(RagError::EmptyQuery) => {
                detail(StatusCode::UNPROCESSABLE_ENTITY, "query must not be empty")
            }
            AppError::Rag(err @ RagError::QueryTooLong { .. }) => {
                detail(StatusCode::PAYLOAD_TOO_LARGE, &err.to_string())
            }
            AppError::Rag(RagError::Generation(_)) => {
                detail(StatusCode::BAD_GATEWAY, "generation backend unavailable")
            }
            AppError::Rag(err) => {
                error!("internal_error" = %err);
                detail(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}
