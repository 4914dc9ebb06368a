//! Configuration types for the render pool and pipeline, with validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SsrCoreError};

/// Default number of warm render contexts.
pub const DEFAULT_MIN_INSTANCES: usize = 2;

/// Default number of acquisitions before a context is recycled.
pub const DEFAULT_MAX_USES: u32 = 50;

/// Default deadline for one command sent to a render context.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5_000;

/// Configuration for the render context pool (validated).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Directory holding the built client (document template and bundles).
    pub front_dist_path: PathBuf,
    /// Entry document filename inside `front_dist_path`.
    pub index_html: String,
    /// Number of contexts kept warm.
    pub min_instances: usize,
    /// Acquisitions after which a context is closed and replaced.
    pub max_uses: u32,
    /// URL a freshly created context boots at.
    pub base_url: String,
    /// NODE_ENV value exposed to the client bundle.
    pub node_env: String,
    /// Deadline for one context command; a context that misses it is
    /// terminated and recycled.
    pub command_timeout_ms: u64,
}

impl PoolConfig {
    /// Create and validate pool config.
    pub fn new(
        front_dist_path: impl Into<PathBuf>,
        index_html: impl Into<String>,
        min_instances: usize,
        max_uses: u32,
        base_url: impl Into<String>,
        node_env: impl Into<String>,
    ) -> Result<Self> {
        if min_instances == 0 {
            return Err(SsrCoreError::InvalidInstanceCount);
        }
        if max_uses == 0 {
            return Err(SsrCoreError::InvalidMaxUses);
        }

        let index_html = index_html.into();
        if index_html.is_empty() || index_html.contains("..") {
            return Err(SsrCoreError::InvalidConfig(format!(
                "invalid entry document name: {index_html:?}"
            )));
        }

        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SsrCoreError::InvalidConfig(format!(
                "base url must be absolute http(s): {base_url}"
            )));
        }

        Ok(Self {
            front_dist_path: front_dist_path.into(),
            index_html,
            min_instances,
            max_uses,
            base_url,
            node_env: node_env.into(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        })
    }

    /// Create with defaults (index.html, 2 instances, 50 uses, production).
    pub fn with_defaults(front_dist_path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(
            front_dist_path,
            "index.html",
            DEFAULT_MIN_INSTANCES,
            DEFAULT_MAX_USES,
            "http://localhost/",
            "production",
        )
    }

    /// Set the per-command deadline.
    pub fn with_command_timeout(mut self, timeout_ms: u64) -> Result<Self> {
        if timeout_ms == 0 {
            return Err(SsrCoreError::InvalidTimeout);
        }
        self.command_timeout_ms = timeout_ms;
        Ok(self)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Full path of the entry document.
    pub fn index_path(&self) -> PathBuf {
        self.front_dist_path.join(&self.index_html)
    }

    /// Directory scripts referenced by the template are resolved against.
    pub fn dist_dir(&self) -> &Path {
        &self.front_dist_path
    }
}

/// Request paths that never reach the render pipeline.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] =
    &["/api", "/auth", "/_", "/healthz", "/livez", "/readyz"];

/// File extensions served as assets rather than documents.
pub const DEFAULT_ASSET_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "css", "map", "json", "txt", "xml", "wasm", "png", "jpg", "jpeg", "gif",
    "svg", "webp", "avif", "ico", "bmp", "woff", "woff2", "ttf", "otf", "eot", "mp4", "webm",
    "mp3", "wav", "ogg", "pdf", "zip", "webmanifest",
];

/// Configuration for per-request orchestration (validated).
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Upper bound on the wait for the loading marker to disappear.
    pub stability_timeout_ms: u64,
    /// Delay between stability probes.
    pub stability_poll_interval_ms: u64,
    /// Upper bound on waiting for a free context (None = wait forever).
    pub acquire_timeout_ms: Option<u64>,
    /// Upper bound on a route loader (None = wait forever).
    pub loader_timeout_ms: Option<u64>,
    /// Id of the element the client removes after its first commit.
    pub loading_marker_id: String,
    /// Route names the client bundle recognizes.
    pub known_routes: Vec<String>,
    /// Route used for unknown or empty path segments.
    pub home_route: String,
    /// Path prefixes that always fall through.
    pub excluded_prefixes: Vec<String>,
    /// Extensions that always fall through.
    pub asset_extensions: Vec<String>,
}

impl PipelineConfig {
    /// Create and validate pipeline config.
    pub fn new(
        stability_timeout_ms: u64,
        stability_poll_interval_ms: u64,
        acquire_timeout_ms: Option<u64>,
        loader_timeout_ms: Option<u64>,
    ) -> Result<Self> {
        if stability_timeout_ms == 0 {
            return Err(SsrCoreError::InvalidTimeout);
        }
        if stability_poll_interval_ms == 0 || stability_poll_interval_ms > stability_timeout_ms {
            return Err(SsrCoreError::InvalidConfig(format!(
                "poll interval must be in 1..={stability_timeout_ms}ms"
            )));
        }

        Ok(Self::unchecked(
            stability_timeout_ms,
            stability_poll_interval_ms,
            acquire_timeout_ms,
            loader_timeout_ms,
        ))
    }

    /// Create with defaults (2s stability, 25ms poll, 10s acquire, 5s loader).
    pub fn with_defaults() -> Self {
        Self::unchecked(2_000, 25, Some(10_000), Some(5_000))
    }

    fn unchecked(
        stability_timeout_ms: u64,
        stability_poll_interval_ms: u64,
        acquire_timeout_ms: Option<u64>,
        loader_timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            stability_timeout_ms,
            stability_poll_interval_ms,
            acquire_timeout_ms,
            loader_timeout_ms,
            loading_marker_id: "loading".to_string(),
            known_routes: Vec::new(),
            home_route: "home".to_string(),
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            asset_extensions: DEFAULT_ASSET_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Set the route names the client bundle recognizes.
    pub fn with_known_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_routes = routes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the fallback route name.
    pub fn with_home_route(mut self, home: impl Into<String>) -> Self {
        self.home_route = home.into();
        self
    }

    /// Set the loading marker element id.
    pub fn with_loading_marker(mut self, id: impl Into<String>) -> Self {
        self.loading_marker_id = id.into();
        self
    }

    pub fn stability_timeout(&self) -> Duration {
        Duration::from_millis(self.stability_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.stability_poll_interval_ms)
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    pub fn loader_timeout(&self) -> Option<Duration> {
        self.loader_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_valid() {
        let config =
            PoolConfig::new("dist", "index.html", 4, 10, "http://localhost/", "production")
                .unwrap();
        assert_eq!(config.min_instances, 4);
        assert_eq!(config.max_uses, 10);
        assert_eq!(config.index_path(), PathBuf::from("dist/index.html"));
    }

    #[test]
    fn test_pool_config_zero_instances() {
        let result = PoolConfig::new("dist", "index.html", 0, 10, "http://localhost/", "test");
        assert!(matches!(result, Err(SsrCoreError::InvalidInstanceCount)));
    }

    #[test]
    fn test_pool_config_zero_max_uses() {
        let result = PoolConfig::new("dist", "index.html", 2, 0, "http://localhost/", "test");
        assert!(matches!(result, Err(SsrCoreError::InvalidMaxUses)));
    }

    #[test]
    fn test_pool_config_rejects_traversal_in_index() {
        let result = PoolConfig::new("dist", "../secret.html", 2, 5, "http://localhost/", "test");
        assert!(matches!(result, Err(SsrCoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_pool_config_rejects_relative_base_url() {
        let result = PoolConfig::new("dist", "index.html", 2, 5, "/relative", "test");
        assert!(matches!(result, Err(SsrCoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_pool_config_with_defaults() {
        let config = PoolConfig::with_defaults("dist").unwrap();
        assert_eq!(config.min_instances, DEFAULT_MIN_INSTANCES);
        assert_eq!(config.max_uses, DEFAULT_MAX_USES);
        assert_eq!(config.index_html, "index.html");
        assert_eq!(config.node_env, "production");
        assert_eq!(config.command_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn test_pool_config_command_timeout() {
        let config = PoolConfig::with_defaults("dist")
            .unwrap()
            .with_command_timeout(250)
            .unwrap();
        assert_eq!(config.command_timeout_ms, 250);

        let result = PoolConfig::with_defaults("dist")
            .unwrap()
            .with_command_timeout(0);
        assert!(matches!(result, Err(SsrCoreError::InvalidTimeout)));
    }

    #[test]
    fn test_pipeline_config_zero_timeout() {
        let result = PipelineConfig::new(0, 25, None, None);
        assert!(matches!(result, Err(SsrCoreError::InvalidTimeout)));
    }

    #[test]
    fn test_pipeline_config_interval_larger_than_timeout() {
        let result = PipelineConfig::new(100, 200, None, None);
        assert!(matches!(result, Err(SsrCoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.stability_timeout(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.acquire_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.loader_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.home_route, "home");
        assert!(config.excluded_prefixes.iter().any(|p| p == "/api"));
    }

    #[test]
    fn test_pipeline_config_builders() {
        let config = PipelineConfig::default()
            .with_known_routes(["about", "posts"])
            .with_home_route("index")
            .with_loading_marker("spinner");
        assert_eq!(config.known_routes, vec!["about", "posts"]);
        assert_eq!(config.home_route, "index");
        assert_eq!(config.loading_marker_id, "spinner");
    }
}
