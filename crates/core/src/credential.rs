//! Signed, expiring bearer credentials.
//!
//! Both kinds are HS256 JWTs carrying a [`Claims`] payload. Access and
//! refresh credentials are signed with different secrets and also carry an
//! explicit `typ` claim, so one can never be accepted in place of the other.
//!
//! Expiry is checked against the caller-supplied instant with zero leeway
//! rather than by `jsonwebtoken` itself. HMAC signature comparison inside
//! `jsonwebtoken` runs in constant time.

use chrono::{DateTime, Duration};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::types::{DbId, Timestamp};

/// Ceiling applied to configured lifetimes that do not fit a `chrono::Duration`.
const MAX_TTL_DAYS: i64 = 36_500;

/// Which secret and lifetime a credential was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Access,
    Refresh,
}

/// JWT claims embedded in every credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject -- the user's internal id.
    pub sub: DbId,
    pub typ: CredentialKind,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Unique token identifier; keeps same-second credentials distinct.
    pub jti: String,
}

/// A freshly minted credential and its validity window.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub token: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialError {
    /// Bad signature, wrong kind, malformed, or expired.
    #[error("invalid credential")]
    Invalid,

    #[error("credential encoding failed: {0}")]
    Encoding(String),
}

struct KindKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

/// Issues and verifies access and refresh credentials.
pub struct CredentialCodec {
    access: KindKeys,
    refresh: KindKeys,
}

impl CredentialCodec {
    pub fn new(config: &SessionConfig) -> Self {
        let keys = |secret: &str, ttl: std::time::Duration| KindKeys {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(MAX_TTL_DAYS)),
        };
        Self {
            access: keys(&config.access_secret, config.access_ttl),
            refresh: keys(&config.refresh_secret, config.refresh_ttl),
        }
    }

    fn keys(&self, kind: CredentialKind) -> &KindKeys {
        match kind {
            CredentialKind::Access => &self.access,
            CredentialKind::Refresh => &self.refresh,
        }
    }

    /// Lifetime of credentials of `kind`.
    pub fn ttl(&self, kind: CredentialKind) -> Duration {
        self.keys(kind).ttl
    }

    /// Mint a credential for `subject` valid from `now` for the kind's TTL.
    pub fn issue(
        &self,
        kind: CredentialKind,
        subject: DbId,
        now: Timestamp,
    ) -> Result<IssuedCredential, CredentialError> {
        let keys = self.keys(kind);
        let iat = now.timestamp();
        let exp = iat + keys.ttl.num_seconds();

        let claims = Claims {
            sub: subject,
            typ: kind,
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| CredentialError::Encoding(e.to_string()))?;

        Ok(IssuedCredential {
            token,
            issued_at: from_unix(iat)?,
            expires_at: from_unix(exp)?,
        })
    }

    /// Check signature, kind, and expiry, returning the subject id.
    pub fn verify(
        &self,
        kind: CredentialKind,
        token: &str,
        now: Timestamp,
    ) -> Result<DbId, CredentialError> {
        let claims = self.decode(kind, token)?;
        if now.timestamp() >= claims.exp {
            return Err(CredentialError::Invalid);
        }
        Ok(claims.sub)
    }

    /// Check signature and kind only; an expired credential still decodes.
    pub fn decode(&self, kind: CredentialKind, token: &str) -> Result<Claims, CredentialError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.keys(kind).decoding, &validation)
            .map_err(|_| CredentialError::Invalid)?
            .claims;

        if claims.typ != kind {
            return Err(CredentialError::Invalid);
        }
        Ok(claims)
    }
}

/// Unix seconds to a UTC timestamp.
pub fn from_unix(secs: i64) -> Result<Timestamp, CredentialError> {
    DateTime::from_timestamp(secs, 0).ok_or(CredentialError::Invalid)
}

/// SHA-256 hex digest of a credential, used as its storage key.
pub fn credential_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
