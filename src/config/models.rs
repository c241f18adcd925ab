//! Configuration data structures for exampro-shim.
//!
//! Defines the schema for the application settings: the HTTP server, the
//! origin the asset cache fronts, the cache manifest, the grader and
//! logging.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything exampro-shim reads from defaults, file and environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Listener address and runtime size.
    #[serde(default)]
    pub server: ServerConfig,

    /// Origin that cache misses and pass-through requests are forwarded to.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Cache version and precache manifest.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Grading evaluator settings.
    #[serde(default)]
    pub grader: GraderConfig,

    /// Log level and output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the HTTP server listens and how many runtime threads it gets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    /// Default: `127.0.0.1`
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    /// Default: `8080`
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads for the tokio runtime.
    /// Default: logical CPU count
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Settings for the origin behind the asset cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the application origin.
    /// Default: `http://127.0.0.1:5173`
    #[serde(default = "default_upstream_url")]
    pub base_url: String,

    /// Connection and request timeout in seconds.
    /// Default: `30`
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Cache version identity and the assets precached on install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Identifier of the current cache version. Bumping it retires every
    /// older version on the next activation.
    /// Default: `exampro-cache-v1`
    #[serde(default = "default_cache_version")]
    pub version: String,

    /// Paths fetched and stored during install.
    /// Default: `["/", "/index.html"]`
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,

    /// Directory holding one subdirectory per cache version. Empty keeps
    /// caches in memory only.
    /// Default: `<user cache dir>/exampro`
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

/// How a returned value is compared with a test case's expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EqualityMode {
    /// Deep comparison; object key order does not matter.
    #[default]
    Structural,
    /// Compare canonical JSON texts; object key order matters.
    Canonical,
}

/// Settings for the grading evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraderConfig {
    /// Result comparison strategy.
    /// Default: `structural`
    #[serde(default)]
    pub equality: EqualityMode,

    /// Largest accepted grading request body, in bytes.
    /// Default: `1048576` (1 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `warn,exampro_shim::script=debug`.
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            version: default_cache_version(),
            assets: default_assets(),
            dir: default_cache_dir(),
        }
    }
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            equality: EqualityMode::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:5173".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_cache_version() -> String {
    "exampro-cache-v1".to_string()
}

fn default_assets() -> Vec<String> {
    vec!["/".to_string(), "/index.html".to_string()]
}

fn default_cache_dir() -> String {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("exampro")
        .to_string_lossy()
        .to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
