use warden_core::config::{ConfigError, SessionConfig};

/// Default interval between expired session/revocation sweeps.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Server configuration loaded from environment variables.
///
/// All server fields have sensible defaults suitable for local development.
/// The session engine's secrets have none and must be provided.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Whether auth cookies carry the `Secure` attribute (`APP_ENV=production`).
    pub secure_cookies: bool,
    /// Seconds between background sweeps of expired state (default: `300`).
    pub sweep_interval_secs: u64,
    /// Externally reachable origin used in verification links.
    pub public_url: String,
    /// Session engine secrets, lifetimes, and limits.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                    |
    /// |-------------------------------|----------------------------|
    /// | `HOST`                        | `0.0.0.0`                  |
    /// | `PORT`                        | `3000`                     |
    /// | `CORS_ORIGINS`                | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                       |
    /// | `APP_ENV`                     | `development`              |
    /// | `SESSION_SWEEP_INTERVAL_SECS` | `300`                      |
    /// | `BASE_URL`                    | `http://localhost:<PORT>`  |
    ///
    /// See [`SessionConfig::from_env`] for the session engine variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port = parse_or(&lookup, "PORT", 3000u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 30u64)?;
        let shutdown_timeout_secs = parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 30u64)?;
        let sweep_interval_secs = parse_or(
            &lookup,
            "SESSION_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "SESSION_SWEEP_INTERVAL_SECS",
                value: "0".into(),
            });
        }

        let secure_cookies = lookup("APP_ENV")
            .is_some_and(|env| env.eq_ignore_ascii_case("production"));

        let public_url = lookup("BASE_URL")
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let session = SessionConfig::from_lookup(&lookup)?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            secure_cookies,
            sweep_interval_secs,
            public_url,
            session,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
