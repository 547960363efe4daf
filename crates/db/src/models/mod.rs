//! Database row structs.
//!
//! Each submodule contains a `FromRow` struct matching the table row and the
//! conversion into the corresponding `warden-core` type.

pub mod revoked_token;
pub mod session;
pub mod user;
