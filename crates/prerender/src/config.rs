use std::env;
use std::path::PathBuf;

use prerender_ssr::{
    PipelineConfig, PoolConfig, SsrCoreError, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_MAX_USES,
    DEFAULT_MIN_INSTANCES,
};

/// Render tuning loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub min_instances: usize,
    pub max_uses: u32,
    /// Deadline for a single context command before the context is
    /// terminated and replaced.
    pub command_timeout_ms: u64,
    pub stability_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// `None` waits for a context indefinitely.
    pub acquire_timeout_ms: Option<u64>,
    /// `None` lets route loaders run indefinitely.
    pub loader_timeout_ms: Option<u64>,
    pub loading_marker: String,
    pub home_route: String,
    pub known_routes: Vec<String>,
    pub base_url: String,
    pub node_env: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PRERENDER_MIN_INSTANCES` - Contexts kept warm (default: 2)
    /// - `PRERENDER_MAX_USES` - Renders before a context is recycled (default: 50)
    /// - `PRERENDER_COMMAND_TIMEOUT_MS` - Per-command context deadline (default: 5000)
    /// - `PRERENDER_STABILITY_TIMEOUT_MS` - Stability wait (default: 2000)
    /// - `PRERENDER_POLL_INTERVAL_MS` - Stability poll interval (default: 25)
    /// - `PRERENDER_ACQUIRE_TIMEOUT_MS` - Context wait, `0` for none (default: 10000)
    /// - `PRERENDER_LOADER_TIMEOUT_MS` - Route data wait, `0` for none (default: 5000)
    /// - `PRERENDER_LOADING_MARKER` - Loading element id (default: "loading")
    /// - `PRERENDER_HOME_ROUTE` - Route for unknown paths (default: "home")
    /// - `PRERENDER_KNOWN_ROUTES` - Comma-separated route names (default: none)
    /// - `PRERENDER_BASE_URL` - URL contexts boot at (default: "http://localhost/")
    /// - `NODE_ENV` - Exposed to the client bundle (default: "production")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        let timeout = |key: &str, default: u64| match number(key) {
            Some(0) => None,
            Some(ms) => Some(ms),
            None => Some(default),
        };

        Self {
            min_instances: number("PRERENDER_MIN_INSTANCES")
                .map_or(DEFAULT_MIN_INSTANCES, |n| n as usize),
            max_uses: number("PRERENDER_MAX_USES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(DEFAULT_MAX_USES),
            command_timeout_ms: number("PRERENDER_COMMAND_TIMEOUT_MS")
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS),
            stability_timeout_ms: number("PRERENDER_STABILITY_TIMEOUT_MS").unwrap_or(2_000),
            poll_interval_ms: number("PRERENDER_POLL_INTERVAL_MS").unwrap_or(25),
            acquire_timeout_ms: timeout("PRERENDER_ACQUIRE_TIMEOUT_MS", 10_000),
            loader_timeout_ms: timeout("PRERENDER_LOADER_TIMEOUT_MS", 5_000),
            loading_marker: get("PRERENDER_LOADING_MARKER").unwrap_or_else(|| "loading".to_string()),
            home_route: get("PRERENDER_HOME_ROUTE").unwrap_or_else(|| "home".to_string()),
            known_routes: get("PRERENDER_KNOWN_ROUTES")
                .map(|routes| {
                    routes
                        .split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            base_url: get("PRERENDER_BASE_URL")
                .unwrap_or_else(|| "http://localhost/".to_string()),
            node_env: get("NODE_ENV").unwrap_or_else(|| "production".to_string()),
        }
    }

    /// Validated pool configuration for the app in `dist`.
    pub fn pool_config(
        &self,
        dist: impl Into<PathBuf>,
        index_html: &str,
    ) -> Result<PoolConfig, SsrCoreError> {
        PoolConfig::new(
            dist,
            index_html,
            self.min_instances,
            self.max_uses,
            self.base_url.as_str(),
            self.node_env.as_str(),
        )?
        .with_command_timeout(self.command_timeout_ms)
    }

    /// Validated per-request configuration.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, SsrCoreError> {
        Ok(PipelineConfig::new(
            self.stability_timeout_ms,
            self.poll_interval_ms,
            self.acquire_timeout_ms,
            self.loader_timeout_ms,
        )?
        .with_known_routes(self.known_routes.iter().cloned())
        .with_home_route(self.home_route.as_str())
        .with_loading_marker(self.loading_marker.as_str()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();

        assert_eq!(config.min_instances, 2);
        assert_eq!(config.max_uses, 50);
        assert_eq!(config.command_timeout_ms, 5_000);
        assert_eq!(config.stability_timeout_ms, 2_000);
        assert_eq!(config.poll_interval_ms, 25);
        assert_eq!(config.acquire_timeout_ms, Some(10_000));
        assert_eq!(config.loader_timeout_ms, Some(5_000));
        assert_eq!(config.loading_marker, "loading");
        assert_eq!(config.home_route, "home");
        assert!(config.known_routes.is_empty());
        assert_eq!(config.base_url, "http://localhost/");
        assert_eq!(config.node_env, "production");
    }

    #[test]
    fn test_zero_timeouts_disable_them() {
        let config = config_from(&[
            ("PRERENDER_ACQUIRE_TIMEOUT_MS", "0"),
            ("PRERENDER_LOADER_TIMEOUT_MS", "0"),
        ]);
        assert_eq!(config.acquire_timeout_ms, None);
        assert_eq!(config.loader_timeout_ms, None);

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.acquire_timeout(), None);
        assert_eq!(pipeline.loader_timeout(), None);
    }

    #[test]
    fn test_known_routes_are_split_and_trimmed() {
        let config = config_from(&[
            ("PRERENDER_KNOWN_ROUTES", " about, posts,,contact "),
            ("PRERENDER_HOME_ROUTE", "landing"),
        ]);
        assert_eq!(config.known_routes, vec!["about", "posts", "contact"]);

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.known_routes, vec!["about", "posts", "contact"]);
        assert_eq!(pipeline.home_route, "landing");
    }

    #[test]
    fn test_unparseable_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("PRERENDER_MIN_INSTANCES", "many"),
            ("PRERENDER_MAX_USES", "99999999999"),
        ]);
        assert_eq!(config.min_instances, 2);
        assert_eq!(config.max_uses, 50);
    }

    #[test]
    fn test_invalid_values_rejected_by_validation() {
        let config = config_from(&[("PRERENDER_MIN_INSTANCES", "0")]);
        assert!(config.pool_config("dist", "index.html").is_err());

        let config = config_from(&[
            ("PRERENDER_STABILITY_TIMEOUT_MS", "100"),
            ("PRERENDER_POLL_INTERVAL_MS", "500"),
        ]);
        assert!(config.pipeline_config().is_err());

        let config = config_from(&[("PRERENDER_BASE_URL", "localhost")]);
        assert!(config.pool_config("dist", "index.html").is_err());
    }

    #[test]
    fn test_pool_config_carries_values() {
        let config = config_from(&[
            ("PRERENDER_MIN_INSTANCES", "4"),
            ("PRERENDER_MAX_USES", "10"),
            ("NODE_ENV", "development"),
        ]);
        let pool = config.pool_config("frontend/dist", "app.html").unwrap();
        assert_eq!(pool.min_instances, 4);
        assert_eq!(pool.max_uses, 10);
        assert_eq!(pool.index_html, "app.html");
        assert_eq!(pool.node_env, "development");
    }

    #[test]
    fn test_command_timeout_reaches_pool_config() {
        let config = config_from(&[("PRERENDER_COMMAND_TIMEOUT_MS", "750")]);
        let pool = config.pool_config("dist", "index.html").unwrap();
        assert_eq!(pool.command_timeout(), std::time::Duration::from_millis(750));

        let config = config_from(&[("PRERENDER_COMMAND_TIMEOUT_MS", "0")]);
        assert!(config.pool_config("dist", "index.html").is_err());
    }
}
