//! Error types for Questline

use hyper::StatusCode;

/// Main error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum QuestlineError {
    /// Malformed input: missing proof, wrong answer count, bad reward spec
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Gate failure: level requirement, missing role, incomplete prerequisites,
    /// or a non-owner acting on a record
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Task, record, badge, or user does not exist (or is inactive)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation attempted from a status that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Optimistic-concurrency miss: the record changed under the caller
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A verification checker or settlement collaborator was unreachable
    /// or errored; the operation is retryable
    #[error("External dependency failed: {0}")]
    ExternalDependency(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuestlineError {
    /// Convert error to HTTP status code for the embedding transport
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ExternalDependency(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and body tuple for HTTP response
    pub fn into_status_code_and_body(self) -> (StatusCode, String) {
        let status = self.status_code();
        let body = self.to_string();
        (status, body)
    }

    /// Whether the caller may retry the operation as-is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalDependency(_) | Self::Conflict(_) | Self::Database(_)
        )
    }
}

// Implement From conversions for common error types

impl From<std::io::Error> for QuestlineError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for QuestlineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for QuestlineError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for QuestlineError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON encode error: {}", err))
    }
}

impl From<bson::de::Error> for QuestlineError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON decode error: {}", err))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, QuestlineError>;
