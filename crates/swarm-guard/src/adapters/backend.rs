//! Runtime-selected torrent client.

use async_trait::async_trait;
use tracing::{info, warn};

use super::connection::ClientConnection;
use super::qbittorrent::QbittorrentAdapter;
use super::transmission::{TransmissionAdapter, SESSION_HEADER};
use crate::config::{ClientKind, GuardConfig};
use crate::domain::{BanTable, PeerObservation, TorrentSnapshot};
use crate::ports::{BackendError, TorrentBackend};

/// One variant per supported client, fixed once detected.
#[derive(Debug, Clone)]
pub enum ClientAdapter {
    Qbittorrent(QbittorrentAdapter),
    Transmission(TransmissionAdapter),
}

impl ClientAdapter {
    pub fn kind(&self) -> ClientKind {
        match self {
            Self::Qbittorrent(_) => ClientKind::Qbittorrent,
            Self::Transmission(_) => ClientKind::Transmission,
        }
    }

    fn session_header(&self) -> Option<&'static str> {
        match self {
            Self::Qbittorrent(_) => None,
            Self::Transmission(_) => Some(SESSION_HEADER),
        }
    }
}

/// Production [`TorrentBackend`]: a connection plus the detected adapter.
#[derive(Debug)]
pub struct Backend {
    connection: ClientConnection,
    adapter: Option<ClientAdapter>,
    client_override: Option<ClientKind>,
    config: GuardConfig,
}

impl Backend {
    pub fn new(config: &GuardConfig) -> Result<Self, BackendError> {
        Ok(Self {
            connection: ClientConnection::from_config(config)?,
            adapter: None,
            client_override: config.client_kind(),
            config: config.clone(),
        })
    }

    pub fn adapter(&self) -> Option<&ClientAdapter> {
        self.adapter.as_ref()
    }

    pub fn connection(&self) -> &ClientConnection {
        &self.connection
    }

    fn build_adapter(&self, kind: ClientKind) -> ClientAdapter {
        match kind {
            ClientKind::Qbittorrent => ClientAdapter::Qbittorrent(QbittorrentAdapter),
            ClientKind::Transmission => {
                ClientAdapter::Transmission(TransmissionAdapter::from_config(&self.config))
            }
        }
    }

    async fn probe(&mut self) -> Option<ClientKind> {
        if QbittorrentAdapter::probe(&mut self.connection).await {
            return Some(ClientKind::Qbittorrent);
        }
        if TransmissionAdapter::probe(&mut self.connection).await {
            return Some(ClientKind::Transmission);
        }
        None
    }
}

#[async_trait]
impl TorrentBackend for Backend {
    fn name(&self) -> &'static str {
        match &self.adapter {
            Some(ClientAdapter::Qbittorrent(_)) => "qBittorrent",
            Some(ClientAdapter::Transmission(_)) => "Transmission",
            None => "undetected",
        }
    }

    async fn detect(&mut self) -> Result<(), BackendError> {
        if self.adapter.is_some() {
            return Ok(());
        }

        let kind = match self.client_override {
            Some(kind) => {
                info!(client = %kind, "Using configured client type");
                kind
            }
            None => match self.probe().await {
                Some(kind) => {
                    info!(client = %kind, "Detected torrent client");
                    kind
                }
                None => {
                    self.connection.transport.set_session_header(None);
                    warn!(url = %self.connection.base_url(), "No supported torrent client answered");
                    return Err(BackendError::NotDetected);
                }
            },
        };

        let adapter = self.build_adapter(kind);
        self.connection
            .transport
            .set_session_header(adapter.session_header());
        self.adapter = Some(adapter);
        Ok(())
    }

    async fn login(&mut self) -> Result<(), BackendError> {
        match &self.adapter {
            Some(ClientAdapter::Qbittorrent(qb)) => qb.login(&mut self.connection).await,
            Some(ClientAdapter::Transmission(tr)) => tr.login(&mut self.connection).await,
            None => Err(BackendError::NotDetected),
        }
    }

    async fn fetch_torrents(&mut self) -> Result<Vec<TorrentSnapshot>, BackendError> {
        match &self.adapter {
            Some(ClientAdapter::Qbittorrent(qb)) => qb.fetch_torrents(&mut self.connection).await,
            Some(ClientAdapter::Transmission(tr)) => tr.fetch_torrents(&mut self.connection).await,
            None => Err(BackendError::NotDetected),
        }
    }

    async fn fetch_torrent_peers(
        &mut self,
        info_hash: &str,
    ) -> Result<Vec<PeerObservation>, BackendError> {
        match &self.adapter {
            Some(ClientAdapter::Qbittorrent(qb)) => {
                qb.fetch_torrent_peers(&mut self.connection, info_hash).await
            }
            Some(ClientAdapter::Transmission(tr)) => {
                tr.fetch_torrent_peers(&mut self.connection, info_hash).await
            }
            None => Err(BackendError::NotDetected),
        }
    }

    async fn submit_bans(&mut self, bans: &BanTable) -> Result<(), BackendError> {
        match &self.adapter {
            Some(ClientAdapter::Qbittorrent(qb)) => qb.submit_bans(&mut self.connection, bans).await,
            Some(ClientAdapter::Transmission(tr)) => {
                tr.submit_bans(&mut self.connection, bans).await
            }
            None => Err(BackendError::NotDetected),
        }
    }

    fn apply_config(&mut self, config: &GuardConfig) -> Result<(), BackendError> {
        self.connection.apply_config(config)?;
        if let Some(ClientAdapter::Transmission(tr)) = &mut self.adapter {
            tr.apply_config(config);
        }
        // The client type is fixed for the process lifetime.
        self.config = config.clone();
        Ok(())
    }
}
