use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Invalid option: {0}")]
    InvalidOption(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Reconciler gave up after {failures} consecutive failures")]
    ReconcilerGaveUp { failures: u32 },
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for TallyError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            TallyError::InvalidOption(_) => (StatusCode::BAD_REQUEST, "Invalid option"),
            TallyError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable"),
            TallyError::ReconcilerGaveUp { .. } | TallyError::Config(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for TallyError {
    fn from(error: sqlx::Error) -> Self {
        TallyError::StoreUnavailable(error.to_string())
    }
}
