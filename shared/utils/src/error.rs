use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CovenantError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Extraction error: {message}")]
    Extraction { message: String },

    #[error("Document type mismatch: declared {declared}, detected {detected}")]
    TypeMismatch { declared: String, detected: String },

    #[error("Business rule violation: {message}")]
    BusinessRule { message: String },

    #[error("Reconciliation error: {message}")]
    Reconciliation { message: String },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Payload too large: {size} bytes exceeds {limit} bytes")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Unsupported media type: {media_type}")]
    UnsupportedMediaType { media_type: String },

    #[error("Pipeline queue is full ({capacity} documents waiting)")]
    QueueFull { capacity: usize },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl CovenantError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::Extraction {
            message: message.into(),
        }
    }

    pub fn type_mismatch(declared: impl Into<String>, detected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            declared: declared.into(),
            detected: detected.into(),
        }
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        Self::BusinessRule {
            message: message.into(),
        }
    }

    pub fn reconciliation(message: impl Into<String>) -> Self {
        Self::Reconciliation {
            message: message.into(),
        }
    }

    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn queue_full(capacity: usize) -> Self {
        Self::QueueFull { capacity }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Only remote-service failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService { .. })
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Extraction { .. } => "EXTRACTION_ERROR",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::BusinessRule { .. } => "BUSINESS_RULE_VIOLATION",
            Self::Reconciliation { .. } => "RECONCILIATION_ERROR",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            Self::QueueFull { .. } => "QUEUE_FULL",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::Database { .. } => 500,
            Self::Validation { .. } => 400,
            Self::ExternalService { .. } => 502,
            Self::Extraction { .. } => 422,
            Self::TypeMismatch { .. } => 422,
            Self::BusinessRule { .. } => 422,
            Self::Reconciliation { .. } => 422,
            Self::InvalidTransition { .. } => 409,
            Self::Configuration { .. } => 500,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::UnsupportedMediaType { .. } => 415,
            Self::QueueFull { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }
}

pub type CovenantResult<T> = Result<T, CovenantError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl From<CovenantError> for ErrorResponse {
    fn from(error: CovenantError) -> Self {
        Self {
            error: error.to_string(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }
}

// Conversion from common error types
impl From<sqlx::Error> for CovenantError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for CovenantError {
    fn from(error: redis::RedisError) -> Self {
        Self::database(error.to_string())
    }
}

impl From<reqwest::Error> for CovenantError {
    fn from(error: reqwest::Error) -> Self {
        Self::external_service("HTTP Client", error.to_string())
    }
}

impl From<serde_json::Error> for CovenantError {
    fn from(error: serde_json::Error) -> Self {
        Self::validation("JSON", error.to_string())
    }
}

impl From<serde_yaml::Error> for CovenantError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::configuration(error.to_string())
    }
}

impl From<validator::ValidationErrors> for CovenantError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "__all__".to_string());
        Self::validation(field, errors.to_string())
    }
}

impl From<std::io::Error> for CovenantError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(error.to_string()),
            _ => Self::internal(error.to_string()),
        }
    }
}
