//! Shared fixtures for unit tests.

use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::SessionConfig;

pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        access_secret: "access-secret-that-is-long-enough".into(),
        refresh_secret: "refresh-secret-that-is-long-enough".into(),
        access_ttl: Duration::from_secs(15 * 60),
        refresh_ttl: Duration::from_secs(7 * 24 * 3600),
        device_cap: 2,
        store_timeout: Duration::from_secs(1),
        verification_ttl: Duration::from_secs(10 * 60),
    }
}

/// Argon2id hash with minimal cost parameters; verification reads the
/// parameters back from the PHC string.
pub(crate) fn cheap_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}
