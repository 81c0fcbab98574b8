//! HTTP handlers for the generation gate.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use super::types::{DecisionResponse, DurationRequest, GenerationRequest, RecordRequest};
use crate::duration::{DurationEstimate, DurationEstimator};
use crate::ratelimit::{Clock, GenerationDecision, GenerationLimiter, GenerationStats, SystemClock};

/// Shared state handed to every handler.
pub struct AppState<C: Clock = SystemClock> {
    pub limiter: Arc<GenerationLimiter<C>>,
    pub estimator: Arc<DurationEstimator>,
}

impl<C: Clock> AppState<C> {
    pub fn new(limiter: Arc<GenerationLimiter<C>>, estimator: Arc<DurationEstimator>) -> Self {
        Self { limiter, estimator }
    }
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            limiter: self.limiter.clone(),
            estimator: self.estimator.clone(),
        }
    }
}

/// Build the API router.
pub fn router<C: Clock + 'static>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generation/check", post(check_generation::<C>))
        .route("/api/generation/record", post(record_generation::<C>))
        .route("/api/generation/acquire", post(acquire_generation::<C>))
        .route("/api/generation/stats/{ip}", get(generation_stats::<C>))
        .route("/api/duration", post(estimate_duration::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Read-only cooldown check.
#[instrument(skip_all, fields(ip = %request.ip, paid = request.paid))]
async fn check_generation<C: Clock + 'static>(
    State(state): State<AppState<C>>,
    Json(request): Json<GenerationRequest>,
) -> Json<DecisionResponse> {
    let decision = state.limiter.can_generate(&request.ip, request.paid);
    Json(decision.into())
}

#[instrument(skip_all, fields(ip = %request.ip))]
async fn record_generation<C: Clock + 'static>(
    State(state): State<AppState<C>>,
    Json(request): Json<RecordRequest>,
) -> Json<GenerationStats> {
    let stats = state.limiter.record_generation(&request.ip);
    info!(
        generation_count = stats.generation_count,
        "Generation recorded"
    );
    Json(stats)
}

/// Check and record atomically; answers 429 while cooling down.
#[instrument(skip_all, fields(ip = %request.ip, paid = request.paid))]
async fn acquire_generation<C: Clock + 'static>(
    State(state): State<AppState<C>>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    let decision = state.limiter.try_acquire(&request.ip, request.paid);

    match decision {
        GenerationDecision::Allowed => {
            info!("Generation acquired");
            Json(DecisionResponse::from(decision)).into_response()
        }
        GenerationDecision::Denied { retry_after, .. } => {
            let retry_secs = retry_after.as_millis().div_ceil(1000).max(1);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_secs.to_string())],
                Json(DecisionResponse::from(decision)),
            )
                .into_response()
        }
    }
}

async fn generation_stats<C: Clock + 'static>(
    State(state): State<AppState<C>>,
    Path(ip): Path<String>,
) -> Json<GenerationStats> {
    Json(state.limiter.get_stats(&ip))
}

#[instrument(skip_all, fields(chars = request.dialogue.len()))]
async fn estimate_duration<C: Clock + 'static>(
    State(state): State<AppState<C>>,
    Json(request): Json<DurationRequest>,
) -> Json<DurationEstimate> {
    Json(state.estimator.estimate(&request.dialogue))
}
