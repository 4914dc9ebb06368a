//! Shared application state.

use std::sync::Arc;

use prerender_ssr::{RenderPool, SsrPipeline};

/// Shared application state.
///
/// Cloned for each request handler; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<SsrPipeline>,
}

impl AppState {
    pub fn new(pipeline: SsrPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pool(&self) -> &RenderPool {
        self.pipeline.pool()
    }
}
