use axum::http::StatusCode;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not reach the data warehouse: {0}")]
    ConnectionError(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Could not render chart: {0}")]
    RenderError(String),

    #[error("Word cloud generation failed: {0}")]
    ImageError(String),

    #[error("Unknown output region: {0}")]
    UnknownOutput(String),
}

impl AppError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConnectionError(_) | AppError::Timeout(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            AppError::QueryError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::RenderError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ImageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UnknownOutput(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::ConnectionError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::QueryError(format!("malformed response: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::ConfigError(format!("invalid service account key: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
