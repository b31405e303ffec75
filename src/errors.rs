// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration not found: {0}")]
    ConfigurationNotFound(String),

    #[error("Configuration already exists for shortcode {shortcode} in environment {environment}")]
    ConfigurationAlreadyExists {
        shortcode: String,
        environment: String,
    },

    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    #[error("Daraja authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Payment initiation failed: {0}")]
    PaymentInitiationFailed(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Invalid filter range: {0}")]
    InvalidFilterRange(String),

    #[error("Invalid filter type: {0}")]
    InvalidFilterType(String),

    #[error("Invalid value '{value}' for field '{field}' of type {field_type}")]
    InvalidFilterValue {
        field: String,
        field_type: String,
        value: String,
    },

    #[error("Unknown filter field: {0}")]
    UnknownFilterField(String),

    #[error("{context}: {source}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("External API error: {0}")]
    ExternalApi(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::ConfigurationNotFound(_) => (StatusCode::NOT_FOUND, "Configuration not found"),
            AppError::ConfigurationAlreadyExists { .. } => (StatusCode::CONFLICT, "Configuration already exists"),
            AppError::ConfigurationIncomplete(_) => (StatusCode::BAD_REQUEST, "Configuration incomplete"),
            AppError::AuthenticationFailed(_) => (StatusCode::BAD_GATEWAY, "Daraja authentication failed"),
            AppError::PaymentInitiationFailed(_) => (StatusCode::BAD_GATEWAY, "Payment initiation failed"),
            AppError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "Payment not found"),
            AppError::InvalidFilterRange(_) => (StatusCode::BAD_REQUEST, "Invalid filter range"),
            AppError::InvalidFilterType(_) => (StatusCode::BAD_REQUEST, "Invalid filter type"),
            AppError::InvalidFilterValue { .. } => (StatusCode::BAD_REQUEST, "Invalid filter value"),
            AppError::UnknownFilterField(_) => (StatusCode::BAD_REQUEST, "Unknown filter field"),
            AppError::OperationFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Operation failed"),
            AppError::MongoDB(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            AppError::Encryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error"),
            AppError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            AppError::ConfigurationError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error"),
            AppError::ExternalApi(_) => (StatusCode::BAD_GATEWAY, "External API error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::ValidationError(format!("JSON parsing error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ExternalApi(format!("HTTP request failed: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }

    pub fn incomplete(msg: impl Into<String>) -> Self {
        AppError::ConfigurationIncomplete(msg.into())
    }

    pub fn external_api(msg: impl Into<String>) -> Self {
        AppError::ExternalApi(msg.into())
    }

    /// Wraps an unexpected failure, keeping the original as the source.
    /// Errors that already carry a caller-facing kind pass through untouched.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        match self {
            AppError::MongoDB(_)
            | AppError::Encryption(_)
            | AppError::Serialization(_)
            | AppError::ExternalApi(_)
            | AppError::ConfigurationError(_) => AppError::OperationFailed {
                context: context.into(),
                source: Box::new(self),
            },
            other => other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::AuthenticationFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
