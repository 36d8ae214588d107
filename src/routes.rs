// src/routes.rs

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeFile, trace::TraceLayer,
};

use crate::{
    error::{AppError, PAYLOAD_TOO_LARGE_MESSAGE},
    handlers::{posts, uploads},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Post API under `/api/posts`, stored images under `/uploads`.
/// * `GET /` serves the front-end page from the static directory.
/// * Applies global middleware (body limit, Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    let max_body_bytes = state.config.max_body_bytes;
    let index_page = ServeFile::new(state.config.static_dir.join("index.html"));

    Router::new()
        .route("/api/posts", get(posts::list_posts).post(posts::create_post))
        .route("/api/posts/{id}", delete(posts::delete_post))
        .route("/uploads/{filename}", get(uploads::serve_upload))
        .route_service("/", index_page)
        // Global Middleware (applied from outside in)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::from_fn(json_payload_too_large))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `RequestBodyLimitLayer` answers oversized requests with a plain-text 413;
/// rewrite it into the usual JSON error body.
async fn json_payload_too_large(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return AppError::PayloadTooLarge(PAYLOAD_TOO_LARGE_MESSAGE.to_string()).into_response();
    }

    response
}
