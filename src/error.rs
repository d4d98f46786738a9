use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream response could not be decoded: {0}")]
    UpstreamDecode(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Timestamp out of range: {0}")]
    Time(#[from] time::error::ComponentRange),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream { .. } | AppError::UpstreamDecode(_) | AppError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to callers. Only validation failures carry detail.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(reason) => reason.clone(),
            AppError::Config(_) => "Missing env vars".to_string(),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), "request failed: {self}");
        }
        let body = serde_json::json!({ "error": self.public_message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request_with_reason() {
        let err = AppError::Validation("Invalid body".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Invalid body");
    }

    #[test]
    fn config_error_hides_variable_name() {
        let err = AppError::Config("AFFILIATE_TOKEN is not set".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Missing env vars");
    }

    #[test]
    fn upstream_error_is_generic_to_callers() {
        let err = AppError::Upstream {
            status: 401,
            body: "bad token".to_string(),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.public_message(), "Internal Server Error");
        assert!(err.to_string().contains("bad token"));
    }
}
