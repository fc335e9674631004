use crate::config::Config;
use crate::streaming::SegmentStreamer;
use crate::transcoding::{start_reaper_task, EncoderControl, JobRegistry, TerminationService};
use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod auth;
pub mod routes_hls;
pub mod routes_transcodes;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    /// Jobs currently producing output, keyed by output path
    pub registry: Arc<JobRegistry>,
    /// Forced kills and idle reaping
    pub termination: Arc<TerminationService>,
    pub streamer: SegmentStreamer,
}

impl AppContext {
    /// Build the context around an explicitly constructed registry.
    pub fn new(config: Config, encoder: Arc<dyn EncoderControl>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let termination = Arc::new(TerminationService::new(
            registry.clone(),
            encoder,
            config.transcoding.idle_timeouts(),
            config.transcoding.delete_files_on_kill,
        ));

        Self {
            streamer: SegmentStreamer::new(registry.clone()),
            config: Arc::new(config),
            registry,
            termination,
        }
    }

    /// Root directory of produced playlists and segments.
    pub fn output_dir(&self) -> &Path {
        &self.config.transcoding.output_dir
    }
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected_routes = routes_hls::protected_routes()
        .merge(routes_transcodes::routes())
        .route_layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(routes_hls::legacy_segment_routes())
        .merge(protected_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Start the HTTP server and the idle-job reaper.
pub async fn start_server(config: Config, encoder: Arc<dyn EncoderControl>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    if let Err(e) = tokio::fs::create_dir_all(&config.transcoding.output_dir).await {
        tracing::warn!(
            "Failed to create transcode output directory {:?}: {}",
            config.transcoding.output_dir,
            e
        );
    }

    let reap_interval = config.transcoding.reap_interval_secs;
    let ctx = AppContext::new(config, encoder);
    let reaper = start_reaper_task(ctx.termination.clone(), reap_interval);

    tracing::info!("Transcode output directory: {:?}", ctx.output_dir());

    let app = create_router(ctx.clone());

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reaper.abort();
    let killed = ctx.termination.kill(&crate::transcoding::MATCH_ALL).await;
    if killed > 0 {
        tracing::info!("Stopped {} transcode jobs on shutdown", killed);
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
