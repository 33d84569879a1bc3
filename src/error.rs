use thiserror::Error;

/// Main error type for the MODEXO backend
#[derive(Error, Debug)]
pub enum ModexoError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    // Payment errors
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Facilitator error: {0}")]
    Facilitator(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Authentication errors
    #[error("Authentication error: {0}")]
    Auth(String),

    // Orchestrator errors
    #[error("Task timed out after {0}s")]
    TaskTimeout(u64),

    #[error("Queue full: {0}")]
    QueueFull(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for ModexoError
pub type Result<T> = std::result::Result<T, ModexoError>;

impl ModexoError {
    /// HTTP status the API layer reports for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;

        match self {
            ModexoError::Validation(_) => StatusCode::BAD_REQUEST,
            ModexoError::NotFound(_) => StatusCode::NOT_FOUND,
            ModexoError::Auth(_) => StatusCode::UNAUTHORIZED,
            ModexoError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ModexoError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            ModexoError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
            ModexoError::TaskTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ModexoError::Http(_)
            | ModexoError::UpstreamStatus { .. }
            | ModexoError::Facilitator(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a retry of the same upstream call could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ModexoError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ModexoError::UpstreamStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ModexoError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ModexoError::RateLimited("slow down".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ModexoError::UpstreamStatus {
                status: 503,
                body: String::new()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_retryable_upstream_status() {
        let server_error = ModexoError::UpstreamStatus {
            status: 502,
            body: "bad gateway".into(),
        };
        let throttled = ModexoError::UpstreamStatus {
            status: 429,
            body: String::new(),
        };
        let not_found = ModexoError::UpstreamStatus {
            status: 404,
            body: String::new(),
        };

        assert!(server_error.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!ModexoError::Validation("x".into()).is_retryable());
    }
}
