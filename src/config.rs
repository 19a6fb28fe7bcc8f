//! Configuration management for Memolane
//!
//! Loads settings from TOML file at ~/.memolane/config.toml

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Image upload limits
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Rate limiting for state-changing requests
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Security response headers
    #[serde(default)]
    pub security: SecurityConfig,

    /// Data directory (defaults to ~/.memolane)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".memolane"))
        .unwrap_or_else(|| PathBuf::from(".memolane"))
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            uploads: UploadConfig::default(),
            rate_limit: RateLimitConfig::default(),
            security: SecurityConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 19480)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server host (default: 127.0.0.1 - localhost only)
    /// WARNING: Setting to "0.0.0.0" exposes the server to your network.
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    19480 // Uncommon port to avoid conflicts
}

fn default_host() -> String {
    "127.0.0.1".to_string() // Localhost only - secure by default
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Image upload limits and checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum image size in bytes (default: 5 MiB)
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Minimum width/height in pixels
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,

    /// Maximum width/height in pixels
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Sniff the true content type from the upload bytes.
    /// When disabled (or sniffing fails), the MIME sub-check is skipped
    /// and the upload is still accepted if the other checks pass.
    #[serde(default = "default_true")]
    pub sniff_mime: bool,
}

fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}

fn default_min_dimension() -> u32 {
    100
}

fn default_max_dimension() -> u32 {
    4000
}

fn default_true() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_bytes: default_max_bytes(),
            min_dimension: default_min_dimension(),
            max_dimension: default_max_dimension(),
            sniff_mime: true,
        }
    }
}

/// Rate limiting configuration for POST/PUT/PATCH/DELETE requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum attempts per client within the window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    3600
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            enabled: true,
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
        }
    }
}

/// Security header configuration
///
/// The fixed headers (nosniff, frame-deny, legacy XSS, referrer policy) are
/// always sent; only the Content-Security-Policy source lists are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Additional allowed origins for script-src
    #[serde(default = "default_script_src")]
    pub script_src: Vec<String>,

    /// Additional allowed origins for style-src
    #[serde(default = "default_style_src")]
    pub style_src: Vec<String>,

    /// Additional allowed origins for font-src
    #[serde(default = "default_font_src")]
    pub font_src: Vec<String>,

    /// Additional allowed sources for img-src
    #[serde(default = "default_img_src")]
    pub img_src: Vec<String>,

    /// Additional allowed origins for connect-src
    #[serde(default)]
    pub connect_src: Vec<String>,
}

fn default_script_src() -> Vec<String> {
    vec!["'unsafe-inline'".into(), "https://cdn.tailwindcss.com".into()]
}

fn default_style_src() -> Vec<String> {
    vec!["'unsafe-inline'".into(), "https://fonts.googleapis.com".into()]
}

fn default_font_src() -> Vec<String> {
    vec!["https://fonts.gstatic.com".into()]
}

fn default_img_src() -> Vec<String> {
    vec!["data:".into(), "blob:".into()]
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            script_src: default_script_src(),
            style_src: default_style_src(),
            font_src: default_font_src(),
            img_src: default_img_src(),
            connect_src: Vec::new(),
        }
    }
}

impl SecurityConfig {
    /// Assemble the Content-Security-Policy header value
    pub fn content_security_policy(&self) -> String {
        let directive = |name: &str, extra: &[String]| {
            let mut parts = vec![name.to_string(), "'self'".to_string()];
            parts.extend(extra.iter().cloned());
            parts.join(" ")
        };

        format!(
            "default-src 'self'; {}; {}; {}; {}; {};",
            directive("script-src", &self.script_src),
            directive("style-src", &self.style_src),
            directive("font-src", &self.font_src),
            directive("img-src", &self.img_src),
            directive("connect-src", &self.connect_src),
        )
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let expanded_path = expand_path(path);

        if !expanded_path.exists() {
            return Err(CoreError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config)
    }

    /// Load configuration from file or use defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".memolane").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".memolane/config.toml"))
    }

    /// Get the data directory, expanding ~ if present
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    /// Directory where uploaded images are stored
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir().join("media")
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> SocketAddr {
        use std::net::ToSocketAddrs;

        format!("{}:{}", self.server.host, self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], self.server.port)))
    }

    /// Create a default configuration file at the given path
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        // Write a well-commented config file
        let content = r#"# Memolane Configuration

[server]
# Port to listen on (default: 19480)
port = 19480

# Host to bind to
# "127.0.0.1" = localhost only (secure, recommended)
# "0.0.0.0" = all interfaces (exposes to network)
host = "127.0.0.1"

[uploads]
# Maximum image size in bytes (5 MiB)
max_bytes = 5242880
# Accepted pixel dimensions (each side)
min_dimension = 100
max_dimension = 4000
# Verify the true content type from the bytes; skipped on failure
sniff_mime = true

[rate_limit]
# Per-client cap on state-changing requests.
# Counters live in process memory: the cap holds per server process
# and resets on restart.
enabled = true
max_attempts = 10
window_secs = 3600

[security]
# Extra allowed origins appended to the Content-Security-Policy,
# on top of 'self' for every directive.
script_src = ["'unsafe-inline'", "https://cdn.tailwindcss.com"]
style_src = ["'unsafe-inline'", "https://fonts.googleapis.com"]
font_src = ["https://fonts.gstatic.com"]
img_src = ["data:", "blob:"]
connect_src = []
"#;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if path.starts_with("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(path.strip_prefix("~").unwrap());
        }
    }
    path.to_path_buf()
}
