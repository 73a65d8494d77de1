//! Transmission JSON-RPC adapter.
//!
//! Every call is a POST to `/transmission/rpc` carrying the
//! `X-Transmission-Session-Id` CSRF token. Transmission cannot ban single
//! IPs over RPC, so bans are written as a P2P blocklist file and the client
//! is told to reload its blocklist from `transmission_blocklist_url`, which
//! must serve that file. Without the URL a push fails and is retried.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use crate::config::GuardConfig;
use crate::domain::{BanTable, PeerObservation, TorrentSnapshot};
use crate::ports::BackendError;
use crate::transport::{RequestOptions, TransportError};

/// CSRF header Transmission hands out on 409.
pub const SESSION_HEADER: &str = "X-Transmission-Session-Id";

const RPC_PATH: &str = "/transmission/rpc";

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentList {
    torrents: Vec<TorrentFields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TorrentFields {
    hash_string: String,
    total_size: i64,
    peers_getting_from_us: i64,
    peers: Vec<PeerFields>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PeerFields {
    address: String,
    port: u16,
    client_name: String,
    progress: f64,
}

#[derive(Debug, Clone)]
pub struct TransmissionAdapter {
    blocklist_path: PathBuf,
    blocklist_url: String,
}

impl TransmissionAdapter {
    pub fn from_config(config: &GuardConfig) -> Self {
        Self {
            blocklist_path: config.transmission_blocklist_path.clone(),
            blocklist_url: config.transmission_blocklist_url.clone(),
        }
    }

    pub fn apply_config(&mut self, config: &GuardConfig) {
        *self = Self::from_config(config);
    }

    pub fn blocklist_path(&self) -> &Path {
        &self.blocklist_path
    }

    /// Whether a Transmission RPC endpoint answers at the configured URL.
    ///
    /// Leaves the session header installed on the transport.
    pub async fn probe(connection: &mut ClientConnection) -> bool {
        connection.transport.set_session_header(Some(SESSION_HEADER));
        let url = connection.url(RPC_PATH);
        let body = json!({ "method": "session-get" }).to_string();
        match connection.transport.post(&url, body, &rpc_options()).await {
            Ok(_) => true,
            Err(TransportError::SessionTokenRefreshed | TransportError::Unauthorized) => true,
            Err(_) => false,
        }
    }

    /// `session-get` doubles as login: it obtains the CSRF token and checks
    /// basic-auth credentials.
    pub async fn login(&self, connection: &mut ClientConnection) -> Result<(), BackendError> {
        match self.call(connection, "session-get", json!({})).await {
            Ok(_) => {
                info!("Connected to Transmission");
                Ok(())
            }
            Err(BackendError::Transport(TransportError::Unauthorized)) => Err(
                BackendError::LoginRejected("wrong username or password".to_string()),
            ),
            Err(e) => Err(e),
        }
    }

    pub async fn fetch_torrents(
        &self,
        connection: &mut ClientConnection,
    ) -> Result<Vec<TorrentSnapshot>, BackendError> {
        let arguments = json!({ "fields": ["hashString", "totalSize", "peersGettingFromUs"] });
        let response = self.rpc(connection, "torrent-get", arguments).await?;
        let list: TorrentList =
            serde_json::from_value(response).map_err(BackendError::decode("torrent list"))?;

        Ok(list
            .torrents
            .into_iter()
            .map(|t| TorrentSnapshot::new(t.hash_string, t.peers_getting_from_us, t.total_size))
            .collect())
    }

    /// Transmission does not report per-peer uploaded bytes; they are 0.
    pub async fn fetch_torrent_peers(
        &self,
        connection: &mut ClientConnection,
        info_hash: &str,
    ) -> Result<Vec<PeerObservation>, BackendError> {
        let arguments = json!({ "ids": [info_hash], "fields": ["hashString", "peers"] });
        let response = self.rpc(connection, "torrent-get", arguments).await?;
        let list: TorrentList =
            serde_json::from_value(response).map_err(BackendError::decode("torrent peers"))?;

        let torrent = list
            .torrents
            .into_iter()
            .find(|t| t.hash_string.eq_ignore_ascii_case(info_hash))
            .ok_or(BackendError::Transport(TransportError::NotFound))?;

        Ok(torrent
            .peers
            .into_iter()
            .map(|p| PeerObservation::new(p.address, p.port, p.client_name, p.progress, 0))
            .collect())
    }

    /// Write the blocklist file, then have Transmission reload it.
    pub async fn submit_bans(
        &self,
        connection: &mut ClientConnection,
        bans: &BanTable,
    ) -> Result<(), BackendError> {
        let content = p2p_blocklist(&bans.sorted_ips());
        tokio::fs::write(&self.blocklist_path, content)
            .await
            .map_err(|source| BackendError::Blocklist {
                path: self.blocklist_path.clone(),
                source,
            })?;

        // Transmission only reloads a blocklist from a URL.
        if self.blocklist_url.is_empty() {
            return Err(BackendError::BlocklistUrlMissing {
                path: self.blocklist_path.clone(),
            });
        }

        let settings = json!({
            "blocklist-enabled": true,
            "blocklist-url": self.blocklist_url,
        });
        self.rpc(connection, "session-set", settings).await?;
        self.rpc(connection, "blocklist-update", json!({})).await?;

        debug!(count = bans.len(), "Submitted blocklist to Transmission");
        Ok(())
    }

    /// RPC call that re-logs in after 403/409-without-token.
    async fn rpc(
        &self,
        connection: &mut ClientConnection,
        method: &'static str,
        arguments: Value,
    ) -> Result<Value, BackendError> {
        match self.call(connection, method, arguments).await {
            Err(BackendError::Transport(e)) if e.requires_login() => {
                if let Err(login_err) = self.login(connection).await {
                    warn!(error = %login_err, "Re-login failed");
                }
                Err(e.into())
            }
            other => other,
        }
    }

    /// Single RPC call. A refreshed session token is retried once.
    async fn call(
        &self,
        connection: &mut ClientConnection,
        method: &'static str,
        arguments: Value,
    ) -> Result<Value, BackendError> {
        let url = connection.url(RPC_PATH);
        let body = json!({ "method": method, "arguments": arguments }).to_string();
        let options = rpc_options();

        let response = match connection.transport.post(&url, body.clone(), &options).await {
            Err(TransportError::SessionTokenRefreshed) => {
                connection.transport.post(&url, body, &options).await?
            }
            other => other?,
        };

        let response: RpcResponse =
            serde_json::from_str(&response).map_err(BackendError::decode(method))?;
        if response.result != "success" {
            return Err(BackendError::Rpc(format!("{method}: {}", response.result)));
        }
        Ok(response.arguments)
    }
}

fn rpc_options() -> RequestOptions {
    RequestOptions::authenticated().with_header("Content-Type", "application/json")
}

/// P2P (PeerGuardian) format: one `name:first-last` range per line.
fn p2p_blocklist(ips: &[String]) -> String {
    ips.iter()
        .map(|ip| format!("swarm-guard:{ip}-{ip}\n"))
        .collect()
}
