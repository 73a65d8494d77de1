//! # Driven Ports (Outbound SPI)
//!
//! What the scheduler requires from the outside world: a torrent client to
//! police, a clock and a configuration source.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{ConfigError, GuardConfig};
use crate::domain::{BanTable, PeerObservation, Timestamp, TorrentSnapshot};
use crate::transport::TransportError;

/// Errors from a torrent client adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("no supported torrent client detected")]
    NotDetected,

    #[error("client RPC failed: {0}")]
    Rpc(String),

    #[error("failed to write blocklist {path}: {source}")]
    Blocklist {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blocklist file exists but nothing tells the client to load it.
    #[error("blocklist written to {path} but transmission_blocklist_url is not set")]
    BlocklistUrlMissing { path: std::path::PathBuf },
}

impl BackendError {
    pub(crate) fn decode(what: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Self::Decode { what, source }
    }
}

/// Contract every supported torrent client implements.
///
/// All calls take `&mut self`: the adapter owns its transport session and
/// the scheduler is its only caller.
#[async_trait]
pub trait TorrentBackend: Send {
    /// Human-readable client name for logs.
    fn name(&self) -> &'static str;

    /// Probe and commit to one client type, or honor the configured override.
    async fn detect(&mut self) -> Result<(), BackendError>;

    /// Establish or refresh an authenticated session. Idempotent.
    async fn login(&mut self) -> Result<(), BackendError>;

    async fn fetch_torrents(&mut self) -> Result<Vec<TorrentSnapshot>, BackendError>;

    async fn fetch_torrent_peers(
        &mut self,
        info_hash: &str,
    ) -> Result<Vec<PeerObservation>, BackendError>;

    /// Push the full ban table. Either everything is sent or nothing is.
    async fn submit_bans(&mut self, bans: &BanTable) -> Result<(), BackendError>;

    /// Pick up a reloaded configuration (URL, credentials, timeout).
    fn apply_config(&mut self, config: &GuardConfig) -> Result<(), BackendError>;
}

/// Abstract interface for time-related operations.
///
/// Production uses the system clock; tests use fixed timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Hot-reloadable configuration.
pub trait ConfigSource: Send {
    /// Return a new configuration if the source changed since the last
    /// successful read, `Ok(None)` if it did not.
    fn poll(&mut self) -> Result<Option<GuardConfig>, ConfigError>;
}
