//! HTTP API
//!
//! Thin REST surface over the orchestrator: analyze, batch-analyze, cached
//! backend status, recent stored analyses, service health and Prometheus
//! metrics. Images travel as base64 JSON fields.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AnalysisError;
use crate::health::HealthState;
use crate::orchestrator::AnalysisOrchestrator;
use crate::storage::AnalysisStore;
use crate::types::{AnalysisOptions, BackendPreference, ImagePayload};

pub struct AppContext {
    pub orchestrator: AnalysisOrchestrator,
    pub store: Option<Arc<AnalysisStore>>,
    pub remote_health: Arc<HealthState>,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/batch-analyze", post(batch_analyze_handler))
        .route("/status", get(status_handler))
        .route("/analyses", get(recent_analyses_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AnalyzeBody {
    image: String,
    #[serde(default)]
    options: ApiOptions,
}

#[derive(Debug, Deserialize)]
struct BatchAnalyzeBody {
    images: Vec<String>,
    #[serde(default)]
    options: ApiOptions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiOptions {
    preferred_backend: Option<BackendPreference>,
    persist: Option<bool>,
    session_id: Option<String>,
    confidence_threshold: Option<f64>,
    include_recommendations: Option<bool>,
}

impl ApiOptions {
    fn into_options(self) -> AnalysisOptions {
        let defaults = AnalysisOptions::default();
        AnalysisOptions {
            preferred_backend: self.preferred_backend.unwrap_or(defaults.preferred_backend),
            persist: self.persist.unwrap_or(defaults.persist),
            session_id: self.session_id,
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            include_recommendations: self
                .include_recommendations
                .unwrap_or(defaults.include_recommendations),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

fn error_response(e: AnalysisError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &e {
        AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AnalysisError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: e.to_string(),
            kind: e.kind(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

async fn analyze_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<AnalyzeBody>,
) -> impl IntoResponse {
    let image = match ImagePayload::from_base64(&body.image) {
        Ok(image) => image,
        Err(e) => return error_response(e).into_response(),
    };

    match ctx.orchestrator.analyze(&image, &body.options.into_options()).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn batch_analyze_handler(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<BatchAnalyzeBody>,
) -> impl IntoResponse {
    let mut images = Vec::with_capacity(body.images.len());
    for encoded in &body.images {
        match ImagePayload::from_base64(encoded) {
            Ok(image) => images.push(image),
            Err(e) => return error_response(e).into_response(),
        }
    }

    match ctx
        .orchestrator
        .batch_analyze(&images, &body.options.into_options())
        .await
    {
        Ok(results) => {
            let total = results.len();
            Json(serde_json::json!({
                "results": results,
                "total": total,
            }))
            .into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

async fn status_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let status = ctx.orchestrator.backend_status();
    let stored = ctx.store.as_ref().map(|s| s.count());

    Json(serde_json::json!({
        "backends": status,
        "stored_analyses": stored,
    }))
}

async fn recent_analyses_handler(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let Some(store) = &ctx.store else {
        return error_response(AnalysisError::Persistence(
            "persistence is disabled".to_string(),
        ))
        .into_response();
    };

    match store.recent(params.limit.min(100)) {
        Ok(records) => Json(serde_json::json!({
            "analyses": records,
            "total": store.count(),
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

async fn health_handler(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let remote = ctx.remote_health.last_snapshot().await;

    Json(serde_json::json!({
        "status": "healthy",
        "service": "breezeframe-analysis-node",
        "version": env!("CARGO_PKG_VERSION"),
        "backends": ctx.orchestrator.backend_status(),
        "remote_analyzer": remote,
    }))
}

async fn metrics_handler() -> String {
    crate::metrics::export_metrics()
}
