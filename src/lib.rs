//! Memolane - headless service for a personal photo-memory timeline
//!
//! This crate provides the core functionality for Memolane:
//! - Field and image validation for memory submissions
//! - SQLite storage of accounts and memories
//! - Media file storage for uploaded images
//! - HTTP API with per-client rate limiting and security headers
//!
//! # Usage
//!
//! As a library:
//! ```ignore
//! use memolane::{Config, Core};
//!
//! let config = Config::from_file("~/.memolane/config.toml").unwrap();
//! let core = Core::new(config).unwrap();
//! // core.start_api_server().await.unwrap();
//! ```
//!
//! As a standalone server (CLI):
//! ```text
//! memolane --config ~/.memolane/config.toml
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod storage;
pub mod validate;

// Re-export main types for convenience
pub use config::Config;
pub use db::Database;
pub use error::{CoreError, Result};

use middleware::RateLimiter;
use storage::MediaStore;
use std::sync::Arc;

/// Core service that coordinates all Memolane functionality
pub struct Core {
    /// Configuration
    pub config: Config,

    /// Database connection
    pub db: Arc<Database>,

    /// Media file store
    media: Arc<MediaStore>,

    /// Rate limiter shared with the request pipeline
    rate_limiter: Arc<RateLimiter>,
}

impl Core {
    /// Create a new Core instance with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config.data_dir().join("memolane.db");
        let db = Database::new(db_path)?;
        let media = MediaStore::new(config.media_dir())?;
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Ok(Core {
            config,
            db: Arc::new(db),
            media: Arc::new(media),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    /// Create a Core instance with an existing database (for embedding)
    pub fn with_database(config: Config, db: Arc<Database>) -> Result<Self> {
        let media = MediaStore::new(config.media_dir())?;
        let rate_limiter = RateLimiter::new(&config.rate_limit);
        Ok(Core {
            config,
            db,
            media: Arc::new(media),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    /// Start the HTTP API server (blocks until shutdown)
    pub async fn start_api_server(&self) -> Result<()> {
        let addr = self.config.server_addr();
        tracing::info!("Starting API server on {}", addr);
        api::serve(
            addr,
            self.db.clone(),
            self.media.clone(),
            self.rate_limiter.clone(),
            &self.config,
        )
        .await
    }

    /// Get a reference to the database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Get a reference to the media store
    pub fn media(&self) -> &Arc<MediaStore> {
        &self.media
    }

    /// Get a reference to the rate limiter
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}
