use axum::{
    routing::{get, post},
    Router,
    extract::{Json, State},
    response::{Html, IntoResponse, Redirect},
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use std::time::{Duration, Instant};

use crate::api::binder;
use crate::api::layout::{render_dashboard, UPDATE_PATH};
use crate::api::models::UpdateRequest;
use crate::api::response;
use crate::AppState;

pub const DASH_PREFIX: &str = "/dash/";
// Upper bound for one region update, retries included.
const UPDATE_TIMEOUT: Duration = Duration::from_secs(90);

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::permanent(DASH_PREFIX) }))
        .route("/dash", get(|| async { Redirect::permanent(DASH_PREFIX) }))
        .route(DASH_PREFIX, get(page_handler))
        .route(UPDATE_PATH, post(update_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .with_state(app_state)
}

async fn page_handler(State(state): State<AppState>) -> Html<String> {
    Html(render_dashboard(&state.options))
}

async fn update_handler(
    State(state): State<AppState>,
    Json(req): Json<UpdateRequest>,
) -> impl IntoResponse {
    let start_time = Instant::now();

    let result = tokio::time::timeout(UPDATE_TIMEOUT, binder::dispatch(&state, &req)).await;

    let elapsed = start_time.elapsed();
    tracing::debug!(output = %req.output, seq = req.seq, elapsed_ms = elapsed.as_millis() as u64, "Update handled");

    match result {
        Ok(Ok(update)) => response::success(update),
        Ok(Err(err)) => {
            tracing::warn!(output = %req.output, error = %err, "Update rejected");
            response::error(err.status_code(), err.to_string())
        }
        Err(_) => {
            tracing::warn!(output = %req.output, "Update timed out after {:?}", elapsed);
            response::error(
                axum::http::StatusCode::REQUEST_TIMEOUT,
                "Request processing timed out".to_string(),
            )
        }
    }
}
