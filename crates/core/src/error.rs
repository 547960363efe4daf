//! Domain error kinds shared by the lifecycle manager and identity verifier.
//!
//! Every failure crosses component boundaries as a typed [`CoreError`]; the
//! HTTP layer maps each kind to a status code.

/// Failure kinds returned by session and identity operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Unknown email or wrong password. Both render the same message.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email address has not been verified")]
    NotVerified,

    /// Missing, malformed, revoked, or expired access credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Refresh credential is past its session's `expires_at`.
    #[error("Refresh token has expired")]
    Expired,

    #[error("No current session credential was presented")]
    MissingCurrentSession,

    /// Transient storage failure; the caller may retry.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input rejected by a business rule, such as a malformed registration
    /// or an unusable verification token.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The write would duplicate a unique value such as an email address.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }
}
