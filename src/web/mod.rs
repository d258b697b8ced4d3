//! Web layer module
//!
//! Thin axum handlers in front of [`ResizePipeline`]. Handlers translate
//! HTTP into pipeline calls and map [`AppError`](crate::errors::AppError)
//! to status codes; they hold no resize logic of their own.

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::ResizePipeline;

pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, HealthResponse, handle_error};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ResizePipeline,
    pub config: Arc<Config>,
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: Arc<Config>, pipeline: ResizePipeline) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address: {e}"))?;

        let app = create_router(AppState { pipeline, config });

        Ok(Self { app, addr })
    }

    /// Serve with a notification when the server is actually listening or fails to bind
    pub async fn serve_with_signal(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
    ) -> Result<()> {
        self.serve_with_cancellation(ready_signal, None).await
    }

    /// Serve until the token is cancelled, or until SIGINT/SIGTERM when no token is given
    pub async fn serve_with_cancellation(
        self,
        ready_signal: tokio::sync::oneshot::Sender<Result<()>>,
        cancellation_token: Option<CancellationToken>,
    ) -> Result<()> {
        let listener = match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(bind_error) => {
                let bind_err_msg = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", bind_err_msg)));
                return Err(anyhow::anyhow!("{}", bind_err_msg));
            }
        };

        let _ = ready_signal.send(Ok(()));
        tracing::info!("Listening on {}", self.addr);

        let shutdown_signal = async move {
            match cancellation_token {
                Some(token) => {
                    token.cancelled().await;
                    tracing::info!("Web server received cancellation signal, shutting down gracefully");
                }
                None => wait_for_termination().await,
            }
        };

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;
        Ok(())
    }
}

/// Create the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.web.max_request_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/v1/resize", post(handlers::resize::resize_images))
        .route("/v1/image/{file}", get(handlers::images::get_image))
        // Middleware (applied in reverse order)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, shutting down gracefully");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, shutting down gracefully"),
        Err(e) => {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
