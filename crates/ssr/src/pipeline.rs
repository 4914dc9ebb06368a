//! Per-request prerender orchestration.
//!
//! filter → warm-up → data pre-fetch → acquire → inject → navigate →
//! stability wait → serialize → release. Every failure after the filter
//! step is logged and turned into a fall-through so the caller can serve the
//! un-prerendered shell instead.

use std::sync::Arc;
use std::time::Instant;

use prerender_ssr_core::{
    check_request, normalize_path, route_name, HydrationPayload, Ineligible, PipelineConfig,
};
use serde::Serialize;
use uuid::Uuid;

use crate::context::Stability;
use crate::error::{Result, SsrError};
use crate::pool::{PooledContext, RenderPool};
use crate::registry::RouteDataRegistry;

/// The parts of an HTTP request the pipeline looks at.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub method: String,
    /// Request path, without the query.
    pub path: String,
    pub query: Option<String>,
    /// Raw `Accept` header.
    pub accept: Option<String>,
}

impl RenderRequest {
    /// A `GET` for `path_and_query` from a client accepting HTML.
    pub fn get(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            query,
            accept: Some("text/html".to_string()),
        }
    }
}

/// A successfully prerendered document.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedPage {
    pub html: String,
    pub route: String,
    pub context_id: Uuid,
    pub stability: Stability,
    /// Whether the client's route hook was invoked.
    pub navigated: bool,
    pub elapsed_ms: u64,
}

/// Why a request was handed to the next responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallThroughReason {
    Ineligible(Ineligible),
    AcquireTimeout,
    PoolShutdown,
    Failed(String),
}

impl std::fmt::Display for FallThroughReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FallThroughReason::Ineligible(reason) => write!(f, "not prerendered: {reason}"),
            FallThroughReason::AcquireTimeout => f.write_str("no render context available"),
            FallThroughReason::PoolShutdown => f.write_str("render pool shut down"),
            FallThroughReason::Failed(error) => write!(f, "render failed: {error}"),
        }
    }
}

/// Terminal state of one request.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(RenderedPage),
    FallThrough(FallThroughReason),
}

impl RenderOutcome {
    fn from_error(error: &SsrError) -> Self {
        RenderOutcome::FallThrough(match error {
            SsrError::AcquireTimeout(_) => FallThroughReason::AcquireTimeout,
            SsrError::PoolShutdown => FallThroughReason::PoolShutdown,
            other => FallThroughReason::Failed(other.to_string()),
        })
    }
}

/// Orchestrates prerendering over a [`RenderPool`].
pub struct SsrPipeline {
    pool: RenderPool,
    registry: Arc<dyn RouteDataRegistry>,
    config: PipelineConfig,
}

impl SsrPipeline {
    pub fn new(
        pool: RenderPool,
        registry: Arc<dyn RouteDataRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            config,
        }
    }

    pub fn pool(&self) -> &RenderPool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Prerender `request`, or explain why it falls through.
    ///
    /// Never fails: the worst outcome is a fall-through.
    pub async fn render(&self, request: &RenderRequest) -> RenderOutcome {
        let start = Instant::now();

        if let Err(reason) = check_request(
            &self.config,
            &request.method,
            &request.path,
            request.accept.as_deref(),
        ) {
            return RenderOutcome::FallThrough(FallThroughReason::Ineligible(reason));
        }

        // First eligible request warms the pool; later ones return at once.
        if let Err(e) = self.pool.init().await {
            tracing::warn!(error = %e, "Render pool warm-up failed");
            return RenderOutcome::from_error(&e);
        }

        let path = normalize_path(&request.path);
        let route = route_name(&path, &self.config.known_routes, &self.config.home_route);
        let payload = self.load_payload(&path).await;

        let lease = match self.acquire().await {
            Ok(context) => Lease::new(&self.pool, context),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "No render context for request");
                return RenderOutcome::from_error(&e);
            }
        };
        let context_id = lease.context().id();
        let url = document_url(
            &self.pool.config().base_url,
            &request.path,
            request.query.as_deref(),
        );

        let result = self.drive(lease.context(), &url, &route, &payload).await;
        lease.release().await;

        match result {
            Ok((html, stability, navigated)) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::info!(
                    path = %path,
                    route = %route,
                    context_id = %context_id,
                    ?stability,
                    elapsed_ms,
                    "Prerendered document"
                );
                RenderOutcome::Rendered(RenderedPage {
                    html,
                    route,
                    context_id,
                    stability,
                    navigated,
                    elapsed_ms,
                })
            }
            Err(e) => {
                tracing::error!(
                    path = %path,
                    context_id = %context_id,
                    error = %e,
                    "Prerender failed"
                );
                RenderOutcome::from_error(&e)
            }
        }
    }

    /// Run the route's loader; any failure yields a `null` payload.
    async fn load_payload(&self, path: &str) -> HydrationPayload {
        let Some(loader) = self.registry.loader(path) else {
            return HydrationPayload::null();
        };

        let load = loader();
        let result = match self.config.loader_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, load).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        path,
                        timeout_ms = timeout.as_millis() as u64,
                        "Route loader timed out"
                    );
                    return HydrationPayload::null();
                }
            },
            None => load.await,
        };

        match result.map(HydrationPayload::new) {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                tracing::warn!(path, error = %e, "Route data rejected");
                HydrationPayload::null()
            }
            Err(e) => {
                tracing::error!(path, error = %e, "Route loader failed");
                HydrationPayload::null()
            }
        }
    }

    async fn acquire(&self) -> Result<PooledContext> {
        match self.config.acquire_timeout() {
            Some(timeout) => self.pool.acquire_timeout(timeout).await,
            None => self.pool.acquire().await,
        }
    }

    /// Inject, navigate, wait, serialize.
    ///
    /// Navigation and stability problems degrade to best-effort markup
    /// unless they left the context unusable; inject and serialize failures
    /// abort.
    async fn drive(
        &self,
        context: &PooledContext,
        url: &str,
        route: &str,
        payload: &HydrationPayload,
    ) -> Result<(String, Stability, bool)> {
        context.inject(payload).await?;

        let navigated = match context.navigate(url, route).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(context_id = %context.id(), "Client has no route hook yet");
                false
            }
            Err(e) if !context.is_usable() => return Err(e),
            Err(e) => {
                tracing::warn!(context_id = %context.id(), route, error = %e, "Navigation failed");
                false
            }
        };

        let stability = match context
            .wait_for_stable(
                self.config.stability_timeout(),
                self.config.poll_interval(),
                &self.config.loading_marker_id,
            )
            .await
        {
            Ok(stability) => stability,
            Err(e) if !context.is_usable() => return Err(e),
            Err(e) => {
                tracing::warn!(context_id = %context.id(), error = %e, "Stability wait failed");
                Stability::TimedOut
            }
        };
        if stability == Stability::TimedOut {
            tracing::warn!(
                context_id = %context.id(),
                route,
                timeout_ms = self.config.stability_timeout_ms,
                "Render did not stabilize, serializing current document"
            );
        }

        let html = context.serialize().await?;
        Ok((html, stability, navigated))
    }
}

/// Absolute URL the client sees for a request.
fn document_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    let origin = match base_url.find("://") {
        Some(scheme_end) => {
            let host_start = scheme_end + 3;
            let host_end = base_url[host_start..]
                .find('/')
                .map_or(base_url.len(), |i| host_start + i);
            &base_url[..host_end]
        }
        None => base_url.trim_end_matches('/'),
    };

    let mut url = format!("{origin}/{}", path.trim_start_matches('/'));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// A checked-out context that finds its way back to the pool even if the
/// request future is dropped mid-render.
struct Lease<'a> {
    pool: &'a RenderPool,
    context: Option<PooledContext>,
}

impl<'a> Lease<'a> {
    fn new(pool: &'a RenderPool, context: PooledContext) -> Self {
        Self {
            pool,
            context: Some(context),
        }
    }

    fn context(&self) -> &PooledContext {
        // Only `release` and `drop` take the context.
        self.context
            .as_ref()
            .unwrap_or_else(|| unreachable!("lease used after release"))
    }

    async fn release(mut self) {
        if let Some(context) = self.context.take() {
            self.pool.release(context).await;
        }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        tracing::debug!(context_id = %context.id(), "Request dropped, releasing render context");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let pool = self.pool.clone();
            handle.spawn(async move { pool.release(context).await });
        }
    }
}
