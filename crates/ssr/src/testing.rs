//! Scripted in-memory render contexts for tests.
//!
//! Behaves like a client bundle with a route hook: navigating replaces the
//! loading marker with the route's markup. Every created context is kept so
//! tests can inspect what happened to it after the pool let go.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use prerender_ssr_core::HydrationPayload;

use crate::context::{RenderContext, RenderContextFactory, Stability};
use crate::error::{Result, SsrError};
use crate::stability::{wait_until_stable, StabilityProbe};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How scripted contexts respond.
#[derive(Debug, Clone)]
pub struct ContextBehavior {
    /// Whether the bundle installed a route hook.
    pub route_hook: bool,
    /// Whether navigating removes the loading marker.
    pub stabilizes: bool,
    /// Whether navigating raises the explicit completion signal.
    pub signals_done: bool,
    pub fail_clear: bool,
    pub fail_inject: bool,
    pub fail_serialize: bool,
    /// Whether navigating hangs the context: the call misses its deadline and
    /// the context stops accepting anything but `close`.
    pub wedge_on_navigate: bool,
    /// Extra latency for every operation.
    pub latency: Duration,
}

impl Default for ContextBehavior {
    fn default() -> Self {
        Self {
            route_hook: true,
            stabilizes: true,
            signals_done: false,
            fail_clear: false,
            fail_inject: false,
            fail_serialize: false,
            wedge_on_navigate: false,
            latency: Duration::ZERO,
        }
    }
}

/// Observable state of one scripted context.
#[derive(Debug)]
pub struct ScriptedState {
    url: Mutex<String>,
    injected: Mutex<Option<serde_json::Value>>,
    route: Mutex<Option<String>>,
    marker_present: AtomicBool,
    done: AtomicBool,
    closed: AtomicBool,
    wedged: AtomicBool,
    behavior: ContextBehavior,
}

impl ScriptedState {
    pub fn url(&self) -> String {
        lock(&self.url).clone()
    }

    pub fn injected(&self) -> Option<serde_json::Value> {
        lock(&self.injected).clone()
    }

    pub fn route(&self) -> Option<String> {
        lock(&self.route).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_wedged(&self) -> bool {
        self.wedged.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() || self.is_wedged() {
            Err(SsrError::ContextClosed)
        } else {
            Ok(())
        }
    }
}

/// A render context driven entirely by [`ContextBehavior`].
pub struct ScriptedContext {
    state: Arc<ScriptedState>,
}

impl ScriptedContext {
    async fn pause(&self) {
        if !self.state.behavior.latency.is_zero() {
            tokio::time::sleep(self.state.behavior.latency).await;
        }
    }
}

struct ScriptedProbe {
    state: Arc<ScriptedState>,
}

impl StabilityProbe for ScriptedProbe {
    async fn poll_stable(&mut self) -> Result<Option<Stability>> {
        self.state.check_open()?;
        Ok(if self.state.done.load(Ordering::SeqCst) {
            Some(Stability::Completed)
        } else if !self.state.marker_present.load(Ordering::SeqCst) {
            Some(Stability::Stable)
        } else {
            None
        })
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn inject(&self, payload: &HydrationPayload) -> Result<()> {
        self.pause().await;
        self.state.check_open()?;
        if self.state.behavior.fail_inject {
            return Err(SsrError::JsExecution("inject failed".to_string()));
        }
        *lock(&self.state.injected) = Some(payload.data().clone());
        Ok(())
    }

    async fn clear_injected(&self) -> Result<()> {
        self.pause().await;
        self.state.check_open()?;
        if self.state.behavior.fail_clear {
            return Err(SsrError::JsExecution("clear failed".to_string()));
        }
        *lock(&self.state.injected) = None;
        self.state.done.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, url: &str, route: &str) -> Result<bool> {
        self.pause().await;
        self.state.check_open()?;
        *lock(&self.state.url) = url.to_string();
        if self.state.behavior.wedge_on_navigate {
            self.state.wedged.store(true, Ordering::SeqCst);
            return Err(SsrError::CommandTimeout(0));
        }
        if !self.state.behavior.route_hook {
            tokio::task::yield_now().await;
            return Ok(false);
        }

        *lock(&self.state.route) = Some(route.to_string());
        if self.state.behavior.stabilizes {
            self.state.marker_present.store(false, Ordering::SeqCst);
        }
        if self.state.behavior.signals_done {
            self.state.done.store(true, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        Ok(true)
    }

    async fn wait_for_stable(
        &self,
        timeout: Duration,
        poll_interval: Duration,
        _marker_id: &str,
    ) -> Result<Stability> {
        let mut probe = ScriptedProbe {
            state: Arc::clone(&self.state),
        };
        wait_until_stable(&mut probe, timeout, poll_interval).await
    }

    async fn serialize(&self) -> Result<String> {
        self.pause().await;
        self.state.check_open()?;
        if self.state.behavior.fail_serialize {
            return Err(SsrError::JsExecution("serialize failed".to_string()));
        }

        let data = match lock(&self.state.injected).as_ref() {
            Some(data) => {
                let body = HydrationPayload::new(data.clone())?.script_body()?;
                format!(r#"<script id="__prerender-data">{body}</script>"#)
            }
            None => String::new(),
        };
        let content = if self.state.marker_present.load(Ordering::SeqCst) {
            r#"<div id="loading">Loading</div>"#.to_string()
        } else {
            let route = self.state.route().unwrap_or_default();
            format!("<h1>{route}</h1>")
        };
        Ok(format!(
            r#"<!DOCTYPE html><html><head>{data}</head><body><div id="root">{content}</div></body></html>"#
        ))
    }

    async fn close(&self) -> Result<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Err(SsrError::ContextClosed);
        }
        Ok(())
    }

    fn is_usable(&self) -> bool {
        !self.state.is_wedged()
    }
}

/// Factory producing [`ScriptedContext`]s.
///
/// Clones share the same record of created contexts.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    behavior: Arc<Mutex<ContextBehavior>>,
    failures: Arc<AtomicUsize>,
    contexts: Arc<Mutex<Vec<Arc<ScriptedState>>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Behavior of contexts created from now on.
    pub fn with_behavior(self, behavior: ContextBehavior) -> Self {
        self.set_behavior(behavior);
        self
    }

    pub fn set_behavior(&self, behavior: ContextBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Fail the next `n` creations.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of contexts successfully created.
    pub fn created(&self) -> usize {
        lock(&self.contexts).len()
    }

    /// Every context created so far, oldest first.
    pub fn contexts(&self) -> Vec<Arc<ScriptedState>> {
        lock(&self.contexts).clone()
    }
}

#[async_trait]
impl RenderContextFactory for ScriptedFactory {
    async fn create(&self, url: &str) -> Result<Box<dyn RenderContext>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SsrError::ContextCreation("scripted failure".to_string()));
        }

        let state = Arc::new(ScriptedState {
            url: Mutex::new(url.to_string()),
            injected: Mutex::new(None),
            route: Mutex::new(None),
            marker_present: AtomicBool::new(true),
            done: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            wedged: AtomicBool::new(false),
            behavior: lock(&self.behavior).clone(),
        });
        lock(&self.contexts).push(Arc::clone(&state));
        Ok(Box::new(ScriptedContext { state }))
    }
}
