//! HTTP API module for Memolane
//!
//! Provides REST API endpoints for registration and the memory timeline.

mod auth;
pub mod routes;

pub use auth::CurrentUser;

use crate::config::{Config, UploadConfig};
use crate::db::Database;
use crate::error::Result;
use crate::middleware::{
    rate_limit_middleware, security_headers_middleware, RateLimiter, SecurityHeaders,
};
use crate::storage::MediaStore;
use crate::validate::image::MimeSniffer;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection
    pub db: Arc<Database>,
    /// Media file store for uploaded images
    pub media: Arc<MediaStore>,
    /// Upload limits
    pub uploads: UploadConfig,
    /// Optional content-type sniffing capability
    pub sniffer: Option<MimeSniffer>,
}

/// Start the HTTP API server
pub async fn serve(
    addr: SocketAddr,
    db: Arc<Database>,
    media: Arc<MediaStore>,
    rate_limiter: Arc<RateLimiter>,
    config: &Config,
) -> Result<()> {
    let state = AppState {
        db,
        media,
        uploads: config.uploads.clone(),
        sniffer: config.uploads.sniff_mime.then_some(MimeSniffer),
    };

    let app = create_router(state, rate_limiter, config);

    // Check if port is already in use (another memolane instance running)
    if tokio::net::TcpStream::connect(addr).await.is_ok() {
        tracing::error!(
            "Port {} is already in use — another memolane instance may be running. \
             Use `curl http://{}/health` to check.",
            addr.port(),
            addr
        );
        return Err(crate::error::CoreError::Api(format!(
            "Port {} already in use",
            addr.port()
        )));
    }

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| crate::error::CoreError::Api(e.to_string()))?;

    Ok(())
}

/// Create the API router with all routes
pub fn create_router(state: AppState, rate_limiter: Arc<RateLimiter>, config: &Config) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let security = SecurityHeaders::from_config(&config.security);

    // Registration is open; everything else resolves an account token
    let open_routes = Router::new().route("/register", post(routes::register));

    let account_routes = Router::new()
        .route("/memories", get(routes::list_memories))
        .route("/memories", post(routes::create_memory))
        .route("/memories/count", get(routes::memory_count))
        .route("/memories/:id", get(routes::get_memory))
        .route("/memories/:id", patch(routes::update_memory))
        .route("/memories/:id", delete(routes::delete_memory))
        .route("/memories/:id/image", get(routes::get_memory_image))
        // Apply auth middleware to account routes only
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let api_routes = open_routes
        .merge(account_routes)
        // State-changing requests pass the rate limiter first
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    // Multipart bodies carry the image itself; leave headroom over the
    // image cap so an oversized upload reaches the validator and gets a
    // field-level rejection instead of a blunt 413
    let body_limit = (state.uploads.max_bytes as usize) * 2;

    Router::new()
        // Health check (public, no auth required)
        .route("/health", get(routes::health))
        // Nest protected routes under /api
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        // Every response, including rate-limit rejections, gets the
        // security headers
        .layer(middleware::from_fn_with_state(
            security,
            security_headers_middleware,
        ))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
