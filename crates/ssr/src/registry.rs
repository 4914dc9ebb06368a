//! Route data registry.
//!
//! Application code owns the mapping from request path to a data loader.
//! The pipeline only asks for a loader and awaits it; a path mapped to no
//! loader renders with a `null` payload.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use prerender_ssr_core::normalize_path;
use serde_json::Value;

/// Asynchronous zero-argument data loader for one route.
pub type RouteLoader = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Maps normalized request paths to optional loaders.
pub trait RouteDataRegistry: Send + Sync {
    /// Loader for `path`; `None` when the route needs no pre-fetch or is
    /// unknown.
    fn loader(&self, path: &str) -> Option<RouteLoader>;
}

/// Registry backed by an exact-match path table.
#[derive(Clone, Default)]
pub struct StaticRouteRegistry {
    routes: HashMap<String, Option<RouteLoader>>,
}

impl StaticRouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader for `path`.
    pub fn route<F, Fut>(mut self, path: &str, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let loader: RouteLoader = Arc::new(move || loader().boxed());
        self.routes.insert(normalize_path(path), Some(loader));
        self
    }

    /// Register `path` as a route that renders without data.
    pub fn static_route(mut self, path: &str) -> Self {
        self.routes.insert(normalize_path(path), None);
        self
    }

    /// Register a prebuilt loader (or `None`) for `path`.
    pub fn insert(&mut self, path: &str, loader: Option<RouteLoader>) {
        self.routes.insert(normalize_path(path), loader);
    }

    /// Whether `path` is registered at all.
    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl RouteDataRegistry for StaticRouteRegistry {
    fn loader(&self, path: &str) -> Option<RouteLoader> {
        self.routes.get(&normalize_path(path)).cloned().flatten()
    }
}

impl std::fmt::Debug for StaticRouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut paths: Vec<_> = self.routes.keys().collect();
        paths.sort();
        f.debug_struct("StaticRouteRegistry")
            .field("paths", &paths)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_loader_lookup_normalizes_path() {
        let registry = StaticRouteRegistry::new()
            .route("/posts/", || async { Ok(json!({ "posts": [] })) })
            .static_route("/about");

        let loader = registry.loader("/posts?page=2").unwrap();
        assert_eq!(loader().await.unwrap(), json!({ "posts": [] }));

        assert!(registry.contains("/about/"));
        assert!(registry.loader("/about").is_none());
        assert!(registry.loader("/missing").is_none());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_loader_errors_are_returned() {
        let registry =
            StaticRouteRegistry::new().route("/", || async { Err(anyhow::anyhow!("backend down")) });
        let loader = registry.loader("").unwrap();
        assert_eq!(loader().await.unwrap_err().to_string(), "backend down");
    }

    #[tokio::test]
    async fn test_loader_can_be_called_repeatedly() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = StaticRouteRegistry::new().route("/count", move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                Ok(json!(n))
            }
        });

        let loader = registry.loader("/count").unwrap();
        assert_eq!(loader().await.unwrap(), json!(1));
        assert_eq!(loader().await.unwrap(), json!(2));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
