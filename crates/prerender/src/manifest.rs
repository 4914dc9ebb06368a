//! Route manifest: which paths pre-fetch data, and from where.
//!
//! ```json
//! {
//!   "/": null,
//!   "/posts": "http://127.0.0.1:8080/api/posts"
//! }
//! ```
//!
//! `null` marks a route that renders without data. A URL becomes that
//! route's loader: the JSON body of a `GET` is the hydration payload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use prerender_ssr::StaticRouteRegistry;
use reqwest::{Client, Url};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read route manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid route manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid data url for route {path}: {url}")]
    InvalidUrl { path: String, url: String },
}

/// Read and parse the manifest at `path`.
pub fn load_manifest(path: &Path, client: Client) -> Result<StaticRouteRegistry, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&content, client)
}

/// Build a registry from manifest JSON.
pub fn parse_manifest(json: &str, client: Client) -> Result<StaticRouteRegistry, ManifestError> {
    let entries: BTreeMap<String, Option<String>> = serde_json::from_str(json)?;

    let mut registry = StaticRouteRegistry::new();
    for (path, url) in entries {
        registry = match url {
            None => registry.static_route(&path),
            Some(url) => {
                let url = match Url::parse(&url) {
                    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => parsed,
                    _ => return Err(ManifestError::InvalidUrl { path, url }),
                };
                let client = client.clone();
                registry.route(&path, move || fetch_json(client.clone(), url.clone()))
            }
        };
    }
    Ok(registry)
}

async fn fetch_json(client: Client, url: Url) -> anyhow::Result<Value> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use axum::{routing::get, Json, Router};
    use prerender_ssr::RouteDataRegistry;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;

    /// Serve a tiny JSON API on an ephemeral port.
    async fn spawn_api() -> String {
        let app = Router::new()
            .route("/posts", get(|| async { Json(json!({ "posts": ["hello"] })) }))
            .route(
                "/broken",
                get(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    #[test]
    fn test_parse_manifest_registers_routes() {
        let registry = parse_manifest(
            r#"{ "/": null, "/posts/": "http://localhost:9/api/posts" }"#,
            Client::new(),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("/"));
        assert!(registry.loader("/").is_none());
        assert!(registry.loader("/posts").is_some());
    }

    #[test]
    fn test_parse_manifest_rejects_bad_input() {
        assert!(matches!(
            parse_manifest("[1, 2]", Client::new()),
            Err(ManifestError::Parse(_))
        ));
        assert!(matches!(
            parse_manifest(r#"{ "/posts": "ftp://example.com/posts" }"#, Client::new()),
            Err(ManifestError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_manifest(r#"{ "/posts": "not a url" }"#, Client::new()),
            Err(ManifestError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_load_manifest_missing_file() {
        let result = load_manifest(Path::new("/nonexistent/routes.json"), Client::new());
        assert!(matches!(result, Err(ManifestError::Read { .. })));
    }

    #[tokio::test]
    async fn test_loader_fetches_json_from_data_url() {
        let base = spawn_api().await;
        let manifest = json!({ "/posts": format!("{base}/posts"), "/broken": format!("{base}/broken") });
        let registry = parse_manifest(&manifest.to_string(), Client::new()).unwrap();

        let loader = registry.loader("/posts").unwrap();
        assert_eq!(loader().await.unwrap(), json!({ "posts": ["hello"] }));

        let loader = registry.loader("/broken").unwrap();
        assert!(loader().await.is_err());
    }
}
