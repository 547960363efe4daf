//! Client details recorded on each session.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::http::HeaderMap;

const UNKNOWN_DEVICE: &str = "Unknown device";
const UNKNOWN_ORIGIN: &str = "Unknown";

/// Device fingerprint and origin address derived from request metadata.
///
/// The fingerprint is the `User-Agent`; the origin is the first
/// `X-Forwarded-For` hop, then the peer address. Handlers may override
/// either from the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub device_fingerprint: String,
    pub origin_address: String,
}

impl ClientContext {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let device_fingerprint = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_DEVICE)
            .to_string();

        let origin_address = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());

        Self {
            device_fingerprint,
            origin_address,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ClientContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, peer))
    }
}
