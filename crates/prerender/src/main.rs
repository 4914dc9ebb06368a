mod app;
mod config;
mod handlers;
mod manifest;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use listenfd::ListenFd;
use prerender_ssr::{
    DenoContextFactory, RenderPool, RouteDataRegistry, SsrPipeline, StaticRouteRegistry,
};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{app::create_app, config::Config, manifest::load_manifest, state::AppState};

/// Prerender - serve a single-page app with hydration-ready HTML
#[derive(Parser, Debug)]
#[command(name = "prerender")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host address to bind the server to
    #[arg(long, short = 'H', default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Port to listen on
    #[arg(long, short, default_value = "3000", env = "PORT")]
    port: u16,

    /// Front-end build output directory
    #[arg(long, default_value = "dist", env = "PRERENDER_DIST")]
    dist: PathBuf,

    /// Entry document inside the dist directory
    #[arg(long, default_value = "index.html", env = "PRERENDER_INDEX")]
    index: String,

    /// JSON route manifest mapping paths to data urls
    #[arg(long, env = "PRERENDER_ROUTES")]
    routes: Option<PathBuf>,

    /// Warm the render pool at startup instead of on the first request
    #[arg(long, env = "PRERENDER_WARM")]
    warm: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "PRERENDER_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    let config = Config::from_env();
    let pool = init_pool(&cli, &config)?;
    let registry = init_registry(&cli)?;
    let pipeline = SsrPipeline::new(pool.clone(), registry, config.pipeline_config()?);

    if cli.warm {
        let pool = pool.clone();
        tokio::spawn(async move {
            if let Err(e) = pool.init().await {
                tracing::error!(error = %e, "Render pool warm-up failed");
            }
        });
    }

    let state = AppState::new(pipeline);
    let app = create_app(state);

    // Auto-reload support via listenfd
    let mut listenfd = ListenFd::from_env();
    let listener = match listenfd.take_tcp_listener(0)? {
        // If we are given a tcp listener on listen fd 0, use that one
        Some(listener) => {
            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)?
        }
        // Otherwise fall back to CLI-specified host:port
        None => {
            let addr = format!("{}:{}", cli.host, cli.port);
            TcpListener::bind(&addr).await?
        }
    };

    tracing::info!("listening on {}", listener.local_addr()?);

    // Run the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "prerender=debug,prerender_ssr=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Build the render pool over the dist directory.
///
/// Reads and parses the entry document and its scripts once; contexts are
/// created lazily by the pool.
fn init_pool(cli: &Cli, config: &Config) -> Result<RenderPool> {
    let pool_config = config.pool_config(cli.dist.clone(), &cli.index)?;
    let factory = DenoContextFactory::new(&pool_config)
        .with_context(|| format!("Failed to load {}", pool_config.index_path().display()))?;

    tracing::info!(
        dist = %pool_config.front_dist_path.display(),
        index = %pool_config.index_html,
        scripts = factory.script_count(),
        min_instances = pool_config.min_instances,
        max_uses = pool_config.max_uses,
        "Initializing render pool"
    );

    Ok(RenderPool::new(pool_config, Arc::new(factory)))
}

fn init_registry(cli: &Cli) -> Result<Arc<dyn RouteDataRegistry>> {
    let Some(path) = &cli.routes else {
        return Ok(Arc::new(StaticRouteRegistry::new()));
    };

    let registry = load_manifest(path, reqwest::Client::new())?;
    tracing::info!(manifest = %path.display(), routes = registry.len(), "Loaded route manifest");
    Ok(Arc::new(registry))
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}
