//! Prerender pool - Imperative Shell.
//!
//! Owns everything with side effects: the embedded JS contexts and their
//! threads, the pool that recycles them, and the per-request pipeline.
//! Pure pieces (config, request filtering, payload escaping, polyfills)
//! live in `prerender_ssr_core`.
//!
//! # Architecture
//!
//! - **Functional Core** (`prerender_ssr_core`): validation, config, polyfills
//! - **Imperative Shell** (this crate): JsRuntime threads, pooling, orchestration
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use prerender_ssr::{
//!     DenoContextFactory, PipelineConfig, PoolConfig, RenderOutcome, RenderPool,
//!     RenderRequest, SsrPipeline, StaticRouteRegistry,
//! };
//!
//! let pool_config = PoolConfig::with_defaults("frontend/dist")?;
//! let factory = DenoContextFactory::new(&pool_config)?;
//! let pool = RenderPool::new(pool_config, Arc::new(factory));
//!
//! let registry = StaticRouteRegistry::new()
//!     .route("/posts", || async { Ok(serde_json::json!({ "posts": [] })) });
//! let pipeline = SsrPipeline::new(pool, Arc::new(registry), PipelineConfig::with_defaults());
//!
//! if let RenderOutcome::Rendered(page) = pipeline.render(&RenderRequest::get("/posts")).await {
//!     println!("{}", page.html);
//! }
//! ```

mod context;
mod deno;
mod error;
mod pipeline;
mod pool;
mod queue;
mod registry;
mod stability;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export core types for convenience
pub use prerender_ssr_core::{
    HydrationPayload, Ineligible, PipelineConfig, PoolConfig, SsrCoreError,
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_MAX_USES, DEFAULT_MIN_INSTANCES, MAX_PAYLOAD_SIZE,
};

// Export shell types
pub use context::{RenderContext, RenderContextFactory, Stability};
pub use deno::DenoContextFactory;
pub use error::{sanitize_error, Result, SsrError};
pub use pipeline::{FallThroughReason, RenderOutcome, RenderRequest, RenderedPage, SsrPipeline};
pub use pool::{HealthStatus, PoolState, PoolStats, PooledContext, RenderPool};
pub use queue::BlockingQueue;
pub use registry::{RouteDataRegistry, RouteLoader, StaticRouteRegistry};
