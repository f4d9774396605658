use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::dispatch::{AutomationError, FeeError, PaymentError, RuleSourceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Rules(RuleSourceError),
    Fee(FeeError),
    Automation(AutomationError),
    Payment(PaymentError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Rules(err) => write!(f, "rule settings error: {}", err),
            AppError::Fee(err) => write!(f, "fee calculation failed: {}", err),
            AppError::Automation(err) => write!(f, "automation failed: {}", err),
            AppError::Payment(err) => write!(f, "payment failed: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Rules(err) => Some(err),
            AppError::Fee(err) => Some(err),
            AppError::Automation(err) => Some(err),
            AppError::Payment(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Rules(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Fee(FeeError::Validation { .. }) => StatusCode::BAD_REQUEST,
            AppError::Fee(_) | AppError::Automation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Payment(_) => StatusCode::CONFLICT,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<RuleSourceError> for AppError {
    fn from(value: RuleSourceError) -> Self {
        Self::Rules(value)
    }
}

impl From<FeeError> for AppError {
    fn from(value: FeeError) -> Self {
        Self::Fee(value)
    }
}

impl From<AutomationError> for AppError {
    fn from(value: AutomationError) -> Self {
        Self::Automation(value)
    }
}

impl From<PaymentError> for AppError {
    fn from(value: PaymentError) -> Self {
        Self::Payment(value)
    }
}
