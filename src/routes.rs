use crate::error::TallyError;
use crate::startup::AppState;
use crate::tally::Snapshot;
use crate::ws::ws_handler;
use axum::{
    Router,
    extract::{Extension, Json},
    http::{
        StatusCode,
        header::{ACCEPT, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option: String,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub message: String,
    pub option: String,
    pub results: Snapshot,
}

#[derive(Debug, Serialize)]
pub struct ResultsResponse {
    pub results: Snapshot,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/vote", post(cast_vote))
        .route("/results", get(get_results))
        .route("/ws", get(ws_handler))
        .layer(Extension(app_state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    axum::http::Method::POST,
                    axum::http::Method::GET,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([CONTENT_TYPE, ACCEPT]),
        )
        .fallback(handler_404)
}

async fn root() -> impl IntoResponse {
    Json(json!({ "message": "Real-time poll API is running" }))
}

/// Cast a vote; only touches the in-memory cache.
pub async fn cast_vote(
    Extension(app_state): Extension<AppState>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse, TallyError> {
    let results = app_state.service.cast_vote(&payload.option)?;

    let response = VoteResponse {
        message: "Vote recorded".to_string(),
        option: payload.option,
        results,
    };

    Ok((StatusCode::OK, Json(response)))
}

pub async fn get_results(Extension(app_state): Extension<AppState>) -> impl IntoResponse {
    Json(ResultsResponse {
        results: app_state.service.current_results(),
    })
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "nothing to see here")
}
