use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use tower_http::{
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::{
    handlers::{
        health::{healthz, livez, readyz},
        prerender::prerender,
    },
    state::AppState,
};

/// Upper bound for a whole request, prerendering included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the application router with all routes and middleware.
///
/// Anything the prerender middleware does not answer is served from the
/// front-end dist directory, with the raw entry document as SPA fallback.
pub fn create_app(state: AppState) -> Router {
    let pool_config = state.pool().config();
    let shell = ServeDir::new(&pool_config.front_dist_path)
        .fallback(ServeFile::new(pool_config.index_path()));

    Router::new()
        .route("/livez", get(livez))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .fallback_service(shell)
        .layer(middleware::from_fn_with_state(state.clone(), prerender))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .with_state(state)
}
