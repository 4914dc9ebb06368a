//! Render context seams.
//!
//! A render context is one isolated, script-executing virtual browser. The
//! pool only ever talks to contexts through these traits, so the deno-backed
//! implementation and the scripted test double are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use prerender_ssr_core::HydrationPayload;
use serde::Serialize;

use crate::error::Result;

/// How a stability wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    /// The loading marker left the document.
    Stable,
    /// The client bundle signalled completion explicitly.
    Completed,
    /// Neither happened before the timeout; markup is best effort.
    TimedOut,
}

/// One stateful rendering environment, borrowed by one request at a time.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Expose `payload` to in-context scripts and embed it in the document.
    async fn inject(&self, payload: &HydrationPayload) -> Result<()>;

    /// Remove every trace of the previous request's payload.
    async fn clear_injected(&self) -> Result<()>;

    /// Move the context to `url` and switch the client to `route`.
    ///
    /// Returns `false` when the client has not installed a route hook.
    /// Scheduled in-context work gets one turn before this returns.
    async fn navigate(&self, url: &str, route: &str) -> Result<bool>;

    /// Poll until `marker_id` is gone or the client signals completion.
    async fn wait_for_stable(
        &self,
        timeout: Duration,
        poll_interval: Duration,
        marker_id: &str,
    ) -> Result<Stability>;

    /// Serialize the full document.
    async fn serialize(&self) -> Result<String>;

    /// Release the context's resources. Later calls fail with `ContextClosed`.
    async fn close(&self) -> Result<()>;

    /// `false` once the context missed a command deadline and was
    /// terminated. Such a context only accepts `close`.
    fn is_usable(&self) -> bool {
        true
    }
}

/// Builds render contexts booted at a URL.
#[async_trait]
pub trait RenderContextFactory: Send + Sync {
    async fn create(&self, url: &str) -> Result<Box<dyn RenderContext>>;
}
