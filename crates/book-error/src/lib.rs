use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Error type surfaced to callers of the admission service
///
/// Infrastructure layers work with `anyhow::Result`; this enum is the
/// boundary type the request layer maps to responses.
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Serialization Errors =====
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    // ===== Message Queue & Kafka Errors =====
    #[error("Kafka error: {0}")]
    Kafka(String),

    // ===== Validation Errors =====
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Whether the caller sent something unusable (as opposed to a server fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Json(_) | AppError::Validation(_) | AppError::NotFound(_)
        )
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            AppError::Json(e) => format!("Invalid JSON: {}", e),
            AppError::Validation(msg) => format!("Validation error: {}", msg),
            AppError::NotFound(msg) => format!("Not found: {}", msg),
            AppError::Storage(_) => "Storage error".to_string(),
            AppError::Kafka(_) => "Message queue error".to_string(),
        }
    }

    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Json(_) => "JSON_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Kafka(_) => "KAFKA_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let code = self.error_code();

        if self.is_client_error() {
            tracing::debug!(
                error = %self,
                error_code = %code,
                "Client error occurred"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = %code,
                "Server error occurred"
            );
        }
    }
}
