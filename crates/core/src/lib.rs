//! Session and credential lifecycle engine.
//!
//! Domain types, business rules, and storage contracts with no HTTP or SQL
//! dependencies. Persistence lives in `warden-db`; the HTTP surface in
//! `warden-api`.

pub mod clock;
pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod mailer;
pub mod memory;
pub mod password;
pub mod registration;
pub mod roles;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;
