use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use class_dispatch::error::AppError;
use class_dispatch::workflows::dispatch::{
    dispatch_router, DispatchRepository, DispatchState, GradeKey, RuleConfig,
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

/// What a freshly loaded settings table resolved to.
#[derive(Debug, Serialize)]
pub(crate) struct RuleSummary {
    pub(crate) session_tiers: Vec<u32>,
    pub(crate) grades: Vec<GradeKey>,
    pub(crate) min_session_fee: u64,
    pub(crate) max_session_fee: u64,
    pub(crate) tax_withholding_rate: f64,
}

impl From<&RuleConfig> for RuleSummary {
    fn from(config: &RuleConfig) -> Self {
        Self {
            session_tiers: config.session_fees.entries().map(|(count, _)| count).collect(),
            grades: config
                .grades
                .definitions()
                .map(|definition| definition.grade)
                .collect(),
            min_session_fee: config.fee_bounds.min,
            max_session_fee: config.fee_bounds.max,
            tax_withholding_rate: config.tax_withholding_rate.as_fraction(),
        }
    }
}

pub(crate) fn with_service_routes<R>(state: DispatchState<R>) -> axum::Router
where
    R: DispatchRepository + 'static,
{
    dispatch_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/rules/reload",
            axum::routing::post(reload_rules_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    if ready {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "initializing" })),
        )
    }
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Re-reads the settings table after an admin save.
pub(crate) async fn reload_rules_endpoint(
    Extension(state): Extension<AppState>,
) -> Result<Json<RuleSummary>, AppError> {
    let config = state.rules.reload()?;
    let summary = RuleSummary::from(config.as_ref());
    info!(
        tiers = summary.session_tiers.len(),
        grades = summary.grades.len(),
        "rule settings reloaded by admin request"
    );
    Ok(Json(summary))
}
