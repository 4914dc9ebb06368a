//! Prerender middleware.
//!
//! Runs every request through the [`SsrPipeline`](prerender_ssr::SsrPipeline).
//! A rendered document short-circuits the stack; anything else continues to
//! the inner service untouched.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};

use prerender_ssr::{FallThroughReason, RenderOutcome, RenderRequest};

use crate::state::AppState;

/// Serve a prerendered document, or fall through to `next`.
pub async fn prerender(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let render_request = RenderRequest {
        method: request.method().as_str().to_string(),
        path: request.uri().path().to_string(),
        query: request.uri().query().map(str::to_string),
        accept: request
            .headers()
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    };

    match state.pipeline.render(&render_request).await {
        RenderOutcome::Rendered(page) => Html(page.html).into_response(),
        RenderOutcome::FallThrough(FallThroughReason::Ineligible(_)) => next.run(request).await,
        RenderOutcome::FallThrough(reason) => {
            tracing::debug!(
                path = %render_request.path,
                %reason,
                "Serving un-prerendered response"
            );
            next.run(request).await
        }
    }
}
