//! Session engine configuration.
//!
//! A [`SessionConfig`] is built once at startup and handed to every component
//! that needs it. Nothing in the engine reads the environment on its own.

use std::time::Duration;

/// Default access token lifetime.
const DEFAULT_ACCESS_TTL: &str = "15m";
/// Default refresh token lifetime.
const DEFAULT_REFRESH_TTL: &str = "7d";
/// Default lifetime of an email verification token.
const DEFAULT_VERIFICATION_TTL: &str = "10m";
/// Default maximum number of concurrent device sessions per user.
const DEFAULT_MAX_DEVICES: usize = 2;
/// Default upper bound on any single store operation.
const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

/// Minimum ratio between refresh and access token lifetimes.
pub const MIN_TTL_RATIO: u32 = 10;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("access and refresh secrets must differ")]
    SharedSecret,

    #[error("refresh token lifetime must be at least 10x the access token lifetime")]
    TtlRatio,

    #[error("MAX_DEVICES_PER_USER must be at least 1")]
    ZeroDeviceCap,
}

/// Secrets, lifetimes, and limits for the session engine.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HMAC-SHA256 secret for access tokens.
    pub access_secret: String,
    /// HMAC-SHA256 secret for refresh tokens.
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Maximum concurrent device sessions per user.
    pub device_cap: usize,
    /// Upper bound on each store round trip.
    pub store_timeout: Duration,
    /// How long an emailed verification token stays redeemable.
    pub verification_ttl: Duration,
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Required | Default |
    /// |----------------------------|----------|---------|
    /// | `JWT_ACCESS_TOKEN_SECRET`  | **yes**  | --      |
    /// | `JWT_REFRESH_TOKEN_SECRET` | **yes**  | --      |
    /// | `ACCESS_TOKEN_EXPIRESIN`   | no       | `15m`   |
    /// | `REFRESH_TOKEN_EXPIRESIN`  | no       | `7d`    |
    /// | `MAX_DEVICES_PER_USER`     | no       | `2`     |
    /// | `STORE_TIMEOUT_MS`         | no       | `2000`  |
    /// | `VERIFICATION_TOKEN_EXPIRESIN` | no   | `10m`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let access_secret = required("JWT_ACCESS_TOKEN_SECRET")?;
        let refresh_secret = required("JWT_REFRESH_TOKEN_SECRET")?;

        let ttl = |key: &'static str, default: &str| {
            let raw = lookup(key).unwrap_or_else(|| default.to_string());
            parse_duration(&raw).ok_or(ConfigError::Invalid { key, value: raw })
        };
        let access_ttl = ttl("ACCESS_TOKEN_EXPIRESIN", DEFAULT_ACCESS_TTL)?;
        let refresh_ttl = ttl("REFRESH_TOKEN_EXPIRESIN", DEFAULT_REFRESH_TTL)?;
        let verification_ttl = ttl("VERIFICATION_TOKEN_EXPIRESIN", DEFAULT_VERIFICATION_TTL)?;

        let device_cap = match lookup("MAX_DEVICES_PER_USER") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "MAX_DEVICES_PER_USER",
                value: raw,
            })?,
            None => DEFAULT_MAX_DEVICES,
        };

        let store_timeout_ms = match lookup("STORE_TIMEOUT_MS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "STORE_TIMEOUT_MS",
                value: raw,
            })?,
            None => DEFAULT_STORE_TIMEOUT_MS,
        };

        let config = Self {
            access_secret,
            refresh_secret,
            access_ttl,
            refresh_ttl,
            device_cap,
            store_timeout: Duration::from_millis(store_timeout_ms),
            verification_ttl,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_ACCESS_TOKEN_SECRET"));
        }
        if self.refresh_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_REFRESH_TOKEN_SECRET"));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::SharedSecret);
        }
        if self.device_cap == 0 {
            return Err(ConfigError::ZeroDeviceCap);
        }
        match self.access_ttl.checked_mul(MIN_TTL_RATIO) {
            Some(min) if !self.access_ttl.is_zero() && self.refresh_ttl >= min => {}
            _ => return Err(ConfigError::TtlRatio),
        }
        if self.verification_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                key: "VERIFICATION_TOKEN_EXPIRESIN",
                value: "0s".into(),
            });
        }
        Ok(())
    }
}

/// Parse a compact duration such as `"30s"`, `"15m"`, `"2h"` or `"7d"`.
///
/// Returns `None` for anything else, including a missing unit.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let unit = raw.chars().last()?;
    let amount: u64 = raw[..raw.len() - unit.len_utf8()].parse().ok()?;
    let secs = match unit {
        's' => amount,
        'm' => amount.checked_mul(60)?,
        'h' => amount.checked_mul(60 * 60)?,
        'd' => amount.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const SECRETS: [(&str, &str); 2] = [
        ("JWT_ACCESS_TOKEN_SECRET", "access-secret"),
        ("JWT_REFRESH_TOKEN_SECRET", "refresh-secret"),
    ];

    #[test]
    fn parses_each_unit() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("15"), None);
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("10w"), None);
        assert_eq!(parse_duration("-5m"), None);
    }

    #[test]
    fn defaults_apply_when_optional_keys_are_absent() {
        let config = SessionConfig::from_lookup(lookup_from(&SECRETS)).unwrap();
        assert_eq!(config.access_ttl, Duration::from_secs(15 * 60));
        assert_eq!(config.refresh_ttl, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(config.device_cap, 2);
        assert_eq!(config.store_timeout, Duration::from_millis(2000));
        assert_eq!(config.verification_ttl, Duration::from_secs(10 * 60));
    }

    #[test]
    fn missing_secret_is_reported() {
        let err = SessionConfig::from_lookup(lookup_from(&SECRETS[..1])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_REFRESH_TOKEN_SECRET"));
    }

    #[test]
    fn shared_secret_is_rejected() {
        let err = SessionConfig::from_lookup(lookup_from(&[
            ("JWT_ACCESS_TOKEN_SECRET", "same"),
            ("JWT_REFRESH_TOKEN_SECRET", "same"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::SharedSecret);
    }

    #[test]
    fn close_lifetimes_are_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("ACCESS_TOKEN_EXPIRESIN", "1h"));
        pairs.push(("REFRESH_TOKEN_EXPIRESIN", "5h"));
        let err = SessionConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::TtlRatio);
    }

    #[test]
    fn overflowing_lifetime_ratio_is_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("ACCESS_TOKEN_EXPIRESIN", "2000000000000000000s"));
        let result = SessionConfig::from_lookup(lookup_from(&pairs));
        assert_eq!(result.unwrap_err(), ConfigError::TtlRatio);
    }

    #[test]
    fn zero_device_cap_is_rejected() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("MAX_DEVICES_PER_USER", "0"));
        let err = SessionConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, ConfigError::ZeroDeviceCap);
    }

    #[test]
    fn unparsable_cap_names_the_key() {
        let mut pairs = SECRETS.to_vec();
        pairs.push(("MAX_DEVICES_PER_USER", "lots"));
        let err = SessionConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "MAX_DEVICES_PER_USER",
                value: "lots".into()
            }
        );
    }
}
