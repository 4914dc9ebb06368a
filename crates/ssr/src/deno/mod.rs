//! Render contexts backed by deno_core.
//!
//! The factory reads the entry document once, parses it into a template, and
//! loads the scripts it references. Every context then boots from that shared
//! bundle on its own thread.

mod runtime;
mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deno_core::ModuleSpecifier;
use prerender_ssr_core::{local_script_path, DocumentTemplate, PoolConfig, ScriptSource};

use crate::context::{RenderContext, RenderContextFactory};
use crate::error::{Result, SsrError};

use self::runtime::{BundleScript, ContextBundle};

pub use self::worker::DenoContext;

/// Builds deno-backed render contexts from a client build directory.
#[derive(Debug, Clone)]
pub struct DenoContextFactory {
    bundle: Arc<ContextBundle>,
    command_timeout: Duration,
}

impl DenoContextFactory {
    /// Load the entry document and its scripts.
    ///
    /// This is an I/O operation that reads the template and every local
    /// script it references from disk.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        let index_path = config.index_path();
        let html = std::fs::read_to_string(&index_path).map_err(|e| SsrError::TemplateLoad {
            path: index_path.display().to_string(),
            reason: e.to_string(),
        })?;
        let template = DocumentTemplate::parse(&html)?;

        let dist = config
            .dist_dir()
            .canonicalize()
            .map_err(|e| SsrError::TemplateLoad {
                path: config.dist_dir().display().to_string(),
                reason: e.to_string(),
            })?;
        let scripts = load_scripts(&template, &dist)?;

        tracing::info!(
            template = %index_path.display(),
            scripts = scripts.len(),
            "Render context factory ready"
        );

        Ok(Self {
            bundle: Arc::new(ContextBundle {
                template_json: template.to_json()?,
                scripts,
                node_env: config.node_env.clone(),
            }),
            command_timeout: config.command_timeout(),
        })
    }

    /// Number of scripts each context executes at boot.
    pub fn script_count(&self) -> usize {
        self.bundle.scripts.len()
    }
}

#[async_trait]
impl RenderContextFactory for DenoContextFactory {
    async fn create(&self, url: &str) -> Result<Box<dyn RenderContext>> {
        let context = DenoContext::spawn(
            Arc::clone(&self.bundle),
            url.to_string(),
            self.command_timeout,
        )
        .await?;
        Ok(Box::new(context))
    }
}

/// Load template scripts in document order.
///
/// Remote scripts are skipped; local ones must resolve inside `dist`.
fn load_scripts(template: &DocumentTemplate, dist: &Path) -> Result<Vec<BundleScript>> {
    let mut scripts = Vec::new();
    let mut inline_count = 0;

    for script in template.scripts() {
        let (path, code) = match &script.source {
            ScriptSource::Inline(code) => {
                inline_count += 1;
                (dist.join(format!("__inline_{inline_count}.mjs")), code.clone())
            }
            ScriptSource::External(src) => {
                let Some(relative) = local_script_path(src) else {
                    tracing::debug!(src = %src, "Skipping remote script");
                    continue;
                };
                let path = resolve_under(dist, relative)?;
                let code = std::fs::read_to_string(&path).map_err(|e| SsrError::TemplateLoad {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                (path, code)
            }
        };

        let specifier =
            ModuleSpecifier::from_file_path(&path).map_err(|_| SsrError::TemplateLoad {
                path: path.display().to_string(),
                reason: "not an absolute file path".to_string(),
            })?;
        scripts.push(BundleScript {
            kind: script.kind,
            specifier,
            code,
        });
    }

    Ok(scripts)
}

/// Resolve `relative` under `dist`, rejecting anything that escapes it.
fn resolve_under(dist: &Path, relative: &str) -> Result<PathBuf> {
    let joined = dist.join(relative);
    let resolved = joined.canonicalize().map_err(|e| SsrError::TemplateLoad {
        path: joined.display().to_string(),
        reason: e.to_string(),
    })?;
    if !resolved.starts_with(dist) {
        return Err(SsrError::TemplateLoad {
            path: joined.display().to_string(),
            reason: "script resolves outside the client build directory".to_string(),
        });
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use prerender_ssr_core::{HydrationPayload, ScriptKind};

    use super::*;
    use crate::context::Stability;
    use crate::pipeline::{RenderOutcome, RenderRequest, SsrPipeline};
    use crate::pool::RenderPool;
    use crate::registry::StaticRouteRegistry;
    use prerender_ssr_core::PipelineConfig;

    const APP_JS: &str = r#"
        window.__prerenderSetRoute = (route) => {
            const root = document.getElementById('root');
            setTimeout(() => {
                root.innerHTML = '<h1 class="title">' + route + '</h1>';
            }, 0);
        };
    "#;

    /// Build a throwaway client directory under the system temp dir.
    fn dist_with(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("prerender-ssr-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, contents) in files {
            let path = dir.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }
        dir
    }

    fn app_dist() -> PathBuf {
        dist_with(&[
            (
                "index.html",
                r#"<!doctype html><html><head><title>App</title></head><body><div id="root"><div id="loading">Loading</div></div><script src="/assets/app.js"></script><script src="https://cdn.example.com/analytics.js"></script></body></html>"#,
            ),
            ("assets/app.js", APP_JS),
        ])
    }

    #[test]
    fn test_factory_loads_local_scripts_and_skips_remote() {
        let dist = app_dist();
        let factory = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap()).unwrap();
        assert_eq!(factory.script_count(), 1);
        assert_eq!(factory.bundle.scripts[0].kind, ScriptKind::Classic);
        assert!(factory.bundle.scripts[0].code.contains("__prerenderSetRoute"));
    }

    #[test]
    fn test_factory_missing_template() {
        let dist = dist_with(&[]);
        let result = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap());
        assert!(matches!(result, Err(SsrError::TemplateLoad { .. })));
    }

    #[test]
    fn test_factory_rejects_script_outside_dist() {
        let outer = dist_with(&[("secret.js", "globalThis.leak = true;")]);
        let dist = outer.join("dist");
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(
            dist.join("index.html"),
            r#"<html><body><script src="../secret.js"></script></body></html>"#,
        )
        .unwrap();

        let result = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap());
        assert!(matches!(result, Err(SsrError::TemplateLoad { .. })));
    }

    #[test]
    fn test_inline_scripts_get_distinct_specifiers() {
        let dist = dist_with(&[(
            "index.html",
            r#"<html><body><script>var a = 1;</script><script type="module">globalThis.b = 2;</script></body></html>"#,
        )]);
        let factory = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap()).unwrap();
        let scripts = &factory.bundle.scripts;
        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts[1].kind, ScriptKind::Module);
        assert_ne!(scripts[0].specifier, scripts[1].specifier);
    }

    #[tokio::test]
    async fn test_context_renders_route_and_isolates_payloads() {
        let dist = app_dist();
        let factory = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap()).unwrap();
        let context = factory.create("http://localhost/").await.unwrap();

        let payload = HydrationPayload::new(serde_json::json!({ "id": 1 })).unwrap();
        context.inject(&payload).await.unwrap();

        assert!(context
            .navigate("http://localhost/about", "about")
            .await
            .unwrap());
        let stability = context
            .wait_for_stable(Duration::from_secs(2), Duration::from_millis(10), "loading")
            .await
            .unwrap();
        assert_eq!(stability, Stability::Stable);

        let html = context.serialize().await.unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<h1 class="title">about</h1>"#));
        assert!(html.contains(r#"window.__PRERENDER_DATA__ = {"id":1};"#));
        assert!(!html.contains("Loading"));

        context.clear_injected().await.unwrap();
        let html = context.serialize().await.unwrap();
        assert!(!html.contains("__PRERENDER_DATA__"));

        context.close().await.unwrap();
        assert!(matches!(
            context.serialize().await,
            Err(SsrError::ContextClosed)
        ));
    }

    #[tokio::test]
    async fn test_context_without_route_hook_times_out() {
        let dist = dist_with(&[(
            "index.html",
            r#"<html><body><div id="loading">Loading</div></body></html>"#,
        )]);
        let factory = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap()).unwrap();
        let context = factory.create("http://localhost/").await.unwrap();

        assert!(!context.navigate("http://localhost/x", "home").await.unwrap());
        let stability = context
            .wait_for_stable(Duration::from_millis(100), Duration::from_millis(20), "loading")
            .await
            .unwrap();
        assert_eq!(stability, Stability::TimedOut);
        assert!(context.serialize().await.unwrap().contains("Loading"));

        context.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_context_creation_fails_on_script_error() {
        let dist = dist_with(&[(
            "index.html",
            r#"<html><body><script>throw new Error("boom");</script></body></html>"#,
        )]);
        let factory = DenoContextFactory::new(&PoolConfig::with_defaults(&dist).unwrap()).unwrap();
        let result = factory.create("http://localhost/").await;
        assert!(matches!(result, Err(SsrError::ContextCreation(_))));
    }

    #[tokio::test]
    async fn test_spinning_route_is_terminated_and_replaced() {
        let dist = dist_with(&[
            (
                "index.html",
                r#"<html><body><div id="root"><div id="loading">Loading</div></div><script src="/app.js"></script></body></html>"#,
            ),
            (
                "app.js",
                r#"
                window.__prerenderSetRoute = (route) => {
                    if (route === 'spin') {
                        setTimeout(() => { while (true) {} }, 0);
                        return;
                    }
                    document.getElementById('root').innerHTML = '<h1>' + route + '</h1>';
                };
                "#,
            ),
        ]);
        let pool_config = PoolConfig::new(dist.clone(), "index.html", 1, 50, "http://localhost/", "test")
            .unwrap()
            .with_command_timeout(500)
            .unwrap();
        let factory = DenoContextFactory::new(&pool_config).unwrap();
        let pool = RenderPool::new(pool_config, Arc::new(factory));
        let config = PipelineConfig::new(200, 10, Some(10_000), Some(500))
            .unwrap()
            .with_known_routes(["about", "spin"]);
        let pipeline = SsrPipeline::new(pool, Arc::new(StaticRouteRegistry::new()), config);

        pipeline.pool().init().await.unwrap();

        let start = Instant::now();
        let outcome = pipeline.render(&RenderRequest::get("/spin")).await;
        assert!(matches!(outcome, RenderOutcome::FallThrough(_)));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(pipeline.pool().stats().recycled_total, 1);

        match pipeline.render(&RenderRequest::get("/about")).await {
            RenderOutcome::Rendered(page) => assert!(page.html.contains("<h1>about</h1>")),
            RenderOutcome::FallThrough(reason) => panic!("expected render, fell through: {reason}"),
        }
        assert_eq!(pipeline.pool().stats().live, 1);

        pipeline.pool().shutdown().await;
    }
}
