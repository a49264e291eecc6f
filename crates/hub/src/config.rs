// Hub server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development. The database pool reads its own tuning vars in
// db/pool.rs — this module covers the core server settings.

use std::net::SocketAddr;

/// Core hub server configuration.
///
/// Constructed via [`HubConfig::from_env`] which reads environment
/// variables and falls back to sensible development defaults.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// PostgreSQL connection string. When unset the hub runs on the
    /// in-memory store (development and tests only).
    pub database_url: Option<String>,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `huddle_hub=debug`).
    pub log_filter: String,
}

impl HubConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `HUDDLE_HUB_HOST` | `0.0.0.0` |
    /// | `HUDDLE_HUB_PORT` | `8080` |
    /// | `HUDDLE_HUB_DATABASE_URL` | *(none — in-memory store)* |
    /// | `HUDDLE_HUB_CORS_ORIGINS` | *(none — cors.rs uses dev defaults)* |
    /// | `HUDDLE_HUB_LOG_FILTER` | `info` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("HUDDLE_HUB_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 =
            env("HUDDLE_HUB_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        Self {
            listen_addr,
            database_url: env("HUDDLE_HUB_DATABASE_URL").ok().filter(|v| !v.is_empty()),
            cors_origins: env("HUDDLE_HUB_CORS_ORIGINS").ok(),
            log_filter: env("HUDDLE_HUB_LOG_FILTER").unwrap_or_else(|_| "info".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;

    fn env_from<'a>(
        pairs: &'a [(&'a str, &'a str)],
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string()).ok_or(VarError::NotPresent)
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = HubConfig::from_env_fn(env_from(&[]));
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(config.database_url.is_none());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = HubConfig::from_env_fn(env_from(&[
            ("HUDDLE_HUB_HOST", "127.0.0.1"),
            ("HUDDLE_HUB_PORT", "9000"),
            ("HUDDLE_HUB_DATABASE_URL", "postgres://localhost/huddle?sslmode=require"),
            ("HUDDLE_HUB_LOG_FILTER", "huddle_hub=debug"),
        ]));
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:9000");
        assert!(config.database_url.is_some());
        assert_eq!(config.log_filter, "huddle_hub=debug");
    }

    #[test]
    fn invalid_port_falls_back_to_default() {
        let config = HubConfig::from_env_fn(env_from(&[("HUDDLE_HUB_PORT", "not-a-port")]));
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn empty_database_url_is_treated_as_unset() {
        let config = HubConfig::from_env_fn(env_from(&[("HUDDLE_HUB_DATABASE_URL", "")]));
        assert!(config.database_url.is_none());
    }
}
