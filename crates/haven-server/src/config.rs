//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use haven_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None`, meaning the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Haven"`
    pub instance_name: String,

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Request body limit in bytes.
    /// Env: `MAX_BODY_SIZE`
    /// Default: 10 MiB
    pub max_body_size: usize,

    /// Largest batch accepted by the external write endpoints.
    /// Env: `MAX_BATCH_ITEMS`
    /// Default: `500`
    pub max_batch_items: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            instance_name: APP_NAME.to_string(),
            admin_token: None,
            max_body_size: 10 * 1024 * 1024, // 10 MiB
            max_batch_items: 500,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(token) = lookup("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        if let Some(val) = lookup("MAX_BODY_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_body_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BODY_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("MAX_BATCH_ITEMS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_batch_items = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BATCH_ITEMS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.instance_name, "Haven");
        assert!(config.admin_token.is_none());
        assert_eq!(config.max_batch_items, 500);
    }

    #[test]
    fn test_env_overrides() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/haven.db"),
            ("ADMIN_TOKEN", "s3cret"),
            ("MAX_BATCH_ITEMS", "20"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/haven.db")));
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.max_batch_items, 20);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("HTTP_ADDR", "not an address"),
            ("MAX_BODY_SIZE", "-1"),
            ("MAX_BATCH_ITEMS", "0"),
            ("ADMIN_TOKEN", ""),
        ]);
        let default = ServerConfig::default();
        assert_eq!(config.http_addr, default.http_addr);
        assert_eq!(config.max_body_size, default.max_body_size);
        assert_eq!(config.max_batch_items, default.max_batch_items);
        assert!(config.admin_token.is_none());
    }
}
