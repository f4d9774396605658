use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::automation::{AutomationError, AutomationOptions, AutomationWorkflow};
use super::domain::{AssignmentId, PaymentId, PaymentStatus, RequestId};
use super::fees::{FeeError, FeeInput};
use super::payments::{PaymentError, PaymentLedger};
use super::repository::{DispatchRepository, RepositoryError};
use crate::security::LoginRateLimiter;

/// Shared handler state.
pub struct DispatchState<R> {
    pub workflow: Arc<AutomationWorkflow<R>>,
    pub payments: Arc<PaymentLedger<R>>,
    pub login: Arc<LoginRateLimiter>,
}

impl<R> Clone for DispatchState<R> {
    fn clone(&self) -> Self {
        Self {
            workflow: Arc::clone(&self.workflow),
            payments: Arc::clone(&self.payments),
            login: Arc::clone(&self.login),
        }
    }
}

impl<R> DispatchState<R>
where
    R: DispatchRepository + 'static,
{
    pub fn new(workflow: Arc<AutomationWorkflow<R>>, login: Arc<LoginRateLimiter>) -> Self {
        let payments = Arc::new(PaymentLedger::new(Arc::clone(workflow.repository())));
        Self {
            workflow,
            payments,
            login,
        }
    }
}

/// Router builder exposing fee, matching, automation, payment and login-limit endpoints.
pub fn dispatch_router<R>(state: DispatchState<R>) -> Router
where
    R: DispatchRepository + 'static,
{
    Router::new()
        .route("/api/v1/fees/compute", post(compute_fee_handler::<R>))
        .route(
            "/api/v1/requests/:request_id/candidates",
            get(candidates_handler::<R>),
        )
        .route(
            "/api/v1/requests/:request_id/automate",
            post(automate_handler::<R>),
        )
        .route(
            "/api/v1/assignments/:assignment_id/payment",
            post(payment_handler::<R>),
        )
        .route(
            "/api/v1/payments/:payment_id/transition",
            post(transition_handler::<R>),
        )
        .route("/api/v1/auth/rate-limit/:ip", get(rate_limit_check_handler::<R>))
        .route(
            "/api/v1/auth/rate-limit/:ip/attempts",
            post(rate_limit_record_handler::<R>),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaymentRequest {
    #[serde(default)]
    bonus: u64,
    #[serde(default)]
    deductions: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionRequest {
    status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginAttempt {
    success: bool,
}

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    let payload = json!({
        "success": false,
        "error": code,
        "message": message,
    });
    (status, axum::Json(payload)).into_response()
}

fn fee_error_response(error: FeeError) -> Response {
    match error {
        FeeError::Validation { .. } => {
            error_response(StatusCode::BAD_REQUEST, "validation", error.to_string())
        }
        FeeError::UnknownSessionCount { .. } => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_session_count",
            error.to_string(),
        ),
        FeeError::UnknownGrade { .. } => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_grade",
            error.to_string(),
        ),
    }
}

fn repository_error_response(error: RepositoryError) -> Response {
    match error {
        RepositoryError::NotFound => {
            error_response(StatusCode::NOT_FOUND, "not_found", error.to_string())
        }
        RepositoryError::Unavailable(_) => {
            warn!(%error, "dispatch repository unavailable");
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                error.to_string(),
            )
        }
        other => error_response(StatusCode::CONFLICT, "conflict", other.to_string()),
    }
}

fn automation_error_response(error: AutomationError) -> Response {
    let message = error.to_string();
    match error {
        AutomationError::RequestNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "request_not_found", message)
        }
        AutomationError::NotAutomatable { .. } => {
            error_response(StatusCode::CONFLICT, "not_automatable", message)
        }
        AutomationError::RequestAlreadyAssigned(_) => {
            error_response(StatusCode::CONFLICT, "request_already_assigned", message)
        }
        AutomationError::ConcurrencyConflict { .. } => {
            error_response(StatusCode::CONFLICT, "concurrency_conflict", message)
        }
        AutomationError::NoEligibleInstructor(_) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "no_eligible_instructor",
            message,
        ),
        AutomationError::BudgetInfeasible { .. } => {
            error_response(StatusCode::UNPROCESSABLE_ENTITY, "budget_infeasible", message)
        }
        AutomationError::Fee(error) => fee_error_response(error),
        AutomationError::Rules(_) => {
            warn!(error = %message, "rule settings unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "rules_unavailable", message)
        }
        AutomationError::Repository(error) => repository_error_response(error),
    }
}

fn payment_error_response(error: PaymentError) -> Response {
    let message = error.to_string();
    match error {
        PaymentError::NotFound(_) | PaymentError::AssignmentNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, "not_found", message)
        }
        PaymentError::AssignmentNotPayable { .. } => {
            error_response(StatusCode::CONFLICT, "assignment_not_payable", message)
        }
        PaymentError::AlreadyCalculated(_) => {
            error_response(StatusCode::CONFLICT, "already_calculated", message)
        }
        PaymentError::Immutable(_) => error_response(StatusCode::CONFLICT, "immutable", message),
        PaymentError::InvalidTransition { .. } => {
            error_response(StatusCode::CONFLICT, "invalid_transition", message)
        }
        PaymentError::Repository(error) => repository_error_response(error),
    }
}

pub(crate) async fn compute_fee_handler<R>(
    State(state): State<DispatchState<R>>,
    axum::Json(input): axum::Json<FeeInput>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    match state.workflow.compute_fee(&input) {
        Ok(breakdown) => (StatusCode::OK, axum::Json(breakdown)).into_response(),
        Err(error) => automation_error_response(error),
    }
}

pub(crate) async fn candidates_handler<R>(
    State(state): State<DispatchState<R>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    let id = RequestId(request_id);
    match state.workflow.rank_instructors(&id) {
        Ok(candidates) => {
            let payload = json!({
                "request_id": id.0,
                "candidates": candidates,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => automation_error_response(error),
    }
}

pub(crate) async fn automate_handler<R>(
    State(state): State<DispatchState<R>>,
    Path(request_id): Path<String>,
    axum::Json(options): axum::Json<AutomationOptions>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    let id = RequestId(request_id);
    match state.workflow.process(&id, options) {
        Ok(outcome) => (StatusCode::CREATED, axum::Json(outcome)).into_response(),
        Err(error) => automation_error_response(error),
    }
}

pub(crate) async fn payment_handler<R>(
    State(state): State<DispatchState<R>>,
    Path(assignment_id): Path<String>,
    axum::Json(request): axum::Json<PaymentRequest>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    let id = AssignmentId(assignment_id);
    match state
        .payments
        .calculate(&id, request.bonus, request.deductions)
    {
        Ok(payment) => (StatusCode::CREATED, axum::Json(payment)).into_response(),
        Err(error) => payment_error_response(error),
    }
}

pub(crate) async fn transition_handler<R>(
    State(state): State<DispatchState<R>>,
    Path(payment_id): Path<String>,
    axum::Json(request): axum::Json<TransitionRequest>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    let id = PaymentId(payment_id);
    match state.payments.transition(&id, request.status) {
        Ok(payment) => (StatusCode::OK, axum::Json(payment)).into_response(),
        Err(error) => payment_error_response(error),
    }
}

pub(crate) async fn rate_limit_check_handler<R>(
    State(state): State<DispatchState<R>>,
    Path(ip): Path<String>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    let decision = state.login.check(&ip);
    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    (status, axum::Json(decision)).into_response()
}

pub(crate) async fn rate_limit_record_handler<R>(
    State(state): State<DispatchState<R>>,
    Path(ip): Path<String>,
    axum::Json(attempt): axum::Json<LoginAttempt>,
) -> Response
where
    R: DispatchRepository + 'static,
{
    let decision = state.login.record(&ip, attempt.success);
    let status = if decision.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    (status, axum::Json(decision)).into_response()
}
