// Configuration loading: defaults, optional file, environment

mod models;

pub use models::*;

use crate::error::{Result, ShimError};
use config::{Config, Environment, File};
use std::path::PathBuf;

impl AppConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Config file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Same as [`AppConfig::load`] with an explicit config file path.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(path).required(false))
            // EXAMPRO_UPSTREAM__BASE_URL -> upstream.base_url
            .add_source(
                Environment::with_prefix("EXAMPRO")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cache.assets")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ShimError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ShimError::Config(e.to_string()))
    }

    /// Bind address for the HTTP server.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".exampro")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache.version, "exampro-cache-v1");
        assert_eq!(config.cache.assets, vec!["/", "/index.html"]);
        assert!(config.cache.dir.ends_with("exampro"));
        assert_eq!(config.grader.equality, EqualityMode::Structural);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[cache]\nversion = \"exampro-cache-v2\"\n\n[grader]\nequality = \"canonical\"\n"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.cache.version, "exampro-cache-v2");
        assert_eq!(config.grader.equality, EqualityMode::Canonical);
        // Untouched sections keep their defaults.
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = AppConfig::load_from("/nonexistent/exampro/config.toml").unwrap();
        assert_eq!(config.upstream.base_url, "http://127.0.0.1:5173");
    }
}
