//! Request extractors for authentication, authorization, and client details.
//!
//! - [`auth::AuthUser`] -- Resolves the caller from a Bearer token or access cookie.
//! - [`rbac::RequireAdmin`] -- Requires the caller's role to hold the admin capability.
//! - [`client::ClientContext`] -- Device fingerprint and origin address of the request.

pub mod auth;
pub mod client;
pub mod rbac;
