//! Transport error taxonomy.

use thiserror::Error;

/// Every non-success outcome of an HTTP exchange with the torrent client.
///
/// Callers treat all of them as "no data this cycle".
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build request: {0}")]
    Build(String),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("unauthenticated (401)")]
    Unauthorized,

    #[error("forbidden (403)")]
    Forbidden,

    #[error("resource not found (404)")]
    NotFound,

    #[error("session token refreshed (409), retry with the new token")]
    SessionTokenRefreshed,

    #[error("conflict (409)")]
    Conflict,

    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),
}

impl TransportError {
    /// HTTP status behind this error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::Forbidden => Some(403),
            Self::NotFound => Some(404),
            Self::SessionTokenRefreshed | Self::Conflict => Some(409),
            Self::UnexpectedStatus(code) => Some(*code),
            Self::Build(_) | Self::Request(_) | Self::Body(_) => None,
        }
    }

    /// Whether the session should be re-established before the next call.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Forbidden | Self::Conflict)
    }

    /// Network-level failure (no usable HTTP response).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Body(_))
    }
}
