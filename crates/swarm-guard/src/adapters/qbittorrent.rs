//! qBittorrent Web API (v2) adapter.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::connection::{form_encode, ClientConnection};
use crate::domain::{BanTable, PeerObservation, TorrentSnapshot};
use crate::ports::BackendError;
use crate::transport::{RequestOptions, TransportError};

const VERSION_PATH: &str = "/api/v2/app/webapiVersion";
const LOGIN_PATH: &str = "/api/v2/auth/login";
const MAINDATA_PATH: &str = "/api/v2/sync/maindata?rid=0";
const PEERS_PATH: &str = "/api/v2/sync/torrentPeers";
const PREFERENCES_PATH: &str = "/api/v2/app/setPreferences";

#[derive(Debug, Default, Deserialize)]
struct MainData {
    #[serde(default)]
    torrents: HashMap<String, TorrentInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TorrentInfo {
    num_leechs: i64,
    total_size: i64,
}

#[derive(Debug, Default, Deserialize)]
struct TorrentPeers {
    #[serde(default)]
    peers: HashMap<String, PeerInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PeerInfo {
    ip: String,
    port: u16,
    client: String,
    progress: f64,
    uploaded: i64,
}

/// Stateless: everything session-related lives in the [`ClientConnection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QbittorrentAdapter;

impl QbittorrentAdapter {
    /// Whether a qBittorrent Web API answers at the configured URL.
    ///
    /// A 403 still proves the API exists: qBittorrent answers unauthenticated
    /// calls that way. A 401 comes from plain HTTP auth in front of some other
    /// server and is left to the next probe.
    pub async fn probe(connection: &mut ClientConnection) -> bool {
        let url = connection.url(VERSION_PATH);
        match connection.transport.get(&url, &RequestOptions::default()).await {
            Ok(version) => {
                debug!(version = %version.trim(), "qBittorrent Web API answered");
                true
            }
            Err(TransportError::Forbidden) => true,
            Err(_) => false,
        }
    }

    pub async fn login(&self, connection: &mut ClientConnection) -> Result<(), BackendError> {
        if connection.username().is_empty() {
            return Ok(());
        }

        let body = form_encode(&[
            ("username", connection.username()),
            ("password", connection.password()),
        ]);
        let url = connection.url(LOGIN_PATH);
        let response = connection
            .transport
            .post(&url, body, &RequestOptions::default())
            .await?;

        match response.trim() {
            "Ok." => {
                info!("Logged in to qBittorrent");
                Ok(())
            }
            "Fails." => Err(BackendError::LoginRejected(
                "wrong username or password".to_string(),
            )),
            other => Err(BackendError::LoginRejected(other.to_string())),
        }
    }

    pub async fn fetch_torrents(
        &self,
        connection: &mut ClientConnection,
    ) -> Result<Vec<TorrentSnapshot>, BackendError> {
        let url = connection.url(MAINDATA_PATH);
        let body = self.get(connection, &url).await?;
        let maindata: MainData =
            serde_json::from_str(&body).map_err(BackendError::decode("maindata"))?;

        Ok(maindata
            .torrents
            .into_iter()
            .map(|(hash, info)| TorrentSnapshot::new(hash, info.num_leechs, info.total_size))
            .collect())
    }

    pub async fn fetch_torrent_peers(
        &self,
        connection: &mut ClientConnection,
        info_hash: &str,
    ) -> Result<Vec<PeerObservation>, BackendError> {
        let url = format!(
            "{}?{}",
            connection.url(PEERS_PATH),
            form_encode(&[("rid", "0"), ("hash", info_hash)])
        );
        let body = self.get(connection, &url).await?;
        let peers: TorrentPeers =
            serde_json::from_str(&body).map_err(BackendError::decode("torrent peers"))?;

        Ok(peers
            .peers
            .into_values()
            .map(|peer| {
                PeerObservation::new(
                    peer.ip,
                    peer.port,
                    peer.client,
                    peer.progress,
                    peer.uploaded,
                )
            })
            .collect())
    }

    /// Replace the client's banned IP list with the table's IPs.
    ///
    /// qBittorrent bans whole IPs, so port selectors are not transmitted.
    pub async fn submit_bans(
        &self,
        connection: &mut ClientConnection,
        bans: &BanTable,
    ) -> Result<(), BackendError> {
        let banned_ips = bans.sorted_ips().join("\n");
        let preferences = serde_json::json!({ "banned_IPs": banned_ips }).to_string();
        let body = form_encode(&[("json", preferences.as_str())]);
        let url = connection.url(PREFERENCES_PATH);
        self.post(connection, &url, body).await?;
        debug!(count = bans.len(), "Submitted banned IPs to qBittorrent");
        Ok(())
    }

    async fn get(&self, connection: &mut ClientConnection, url: &str) -> Result<String, BackendError> {
        let options = RequestOptions::authenticated();
        let result = connection.transport.get(url, &options).await;
        self.relogin_on_auth_error(connection, result).await
    }

    async fn post(
        &self,
        connection: &mut ClientConnection,
        url: &str,
        body: String,
    ) -> Result<String, BackendError> {
        let options = RequestOptions::authenticated();
        let result = connection.transport.post(url, body, &options).await;
        self.relogin_on_auth_error(connection, result).await
    }

    /// Re-login after 403/409 so the next call succeeds; this call still fails.
    async fn relogin_on_auth_error(
        &self,
        connection: &mut ClientConnection,
        result: Result<String, TransportError>,
    ) -> Result<String, BackendError> {
        match result {
            Err(e) if e.requires_login() => {
                if let Err(login_err) = self.login(connection).await {
                    warn!(error = %login_err, "Re-login failed");
                }
                Err(e.into())
            }
            other => other.map_err(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Form, Router};

    use super::*;
    use crate::config::GuardConfig;
    use crate::domain::{BanMethod, PortSelector, Timestamp};
    use crate::test_utils::spawn_http;

    #[derive(Default)]
    struct Recorded {
        logins: AtomicUsize,
        preferences: Mutex<Vec<String>>,
        peer_queries: Mutex<Vec<HashMap<String, String>>>,
    }

    fn router(recorded: Arc<Recorded>) -> Router {
        Router::new()
            .route("/api/v2/app/webapiVersion", get(|| async { "2.8.3" }))
            .route(
                "/api/v2/auth/login",
                post(
                    |State(rec): State<Arc<Recorded>>,
                     Form(form): Form<HashMap<String, String>>| async move {
                        rec.logins.fetch_add(1, Ordering::SeqCst);
                        if form.get("password").map(String::as_str) == Some("secret") {
                            "Ok."
                        } else {
                            "Fails."
                        }
                    },
                ),
            )
            .route(
                "/api/v2/sync/maindata",
                get(|| async {
                    r#"{"rid":1,"torrents":{
                        "aaa":{"num_leechs":2,"total_size":1000,"name":"a"},
                        "bbb":{"num_leechs":0,"total_size":5}
                    }}"#
                }),
            )
            .route(
                "/api/v2/sync/torrentPeers",
                get(
                    |State(rec): State<Arc<Recorded>>,
                     Query(query): Query<HashMap<String, String>>| async move {
                        rec.peer_queries.lock().unwrap().push(query);
                        r#"{"peers":{"1.2.3.4:6881":{"ip":"1.2.3.4","port":6881,
                            "client":"qBittorrent 4.6","progress":0.25,"uploaded":4096}}}"#
                    },
                ),
            )
            .route(
                "/api/v2/app/setPreferences",
                post(
                    |State(rec): State<Arc<Recorded>>,
                     Form(form): Form<HashMap<String, String>>| async move {
                        let json = form.get("json").cloned().unwrap_or_default();
                        rec.preferences.lock().unwrap().push(json);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(recorded)
    }

    async fn connection(base: &str, username: &str, password: &str) -> ClientConnection {
        let config = GuardConfig {
            client_url: base.to_string(),
            client_username: username.to_string(),
            client_password: password.to_string(),
            ..GuardConfig::default()
        };
        ClientConnection::from_config(&config).unwrap()
    }

    // =========================================================================
    // DETECTION AND LOGIN
    // =========================================================================

    #[tokio::test]
    async fn test_probe_detects_web_api() {
        let base = spawn_http(router(Arc::default())).await;
        let mut conn = connection(&base, "", "").await;
        assert!(QbittorrentAdapter::probe(&mut conn).await);
    }

    #[tokio::test]
    async fn test_probe_rejects_other_servers() {
        let base = spawn_http(Router::new()).await;
        let mut conn = connection(&base, "", "").await;
        assert!(!QbittorrentAdapter::probe(&mut conn).await);
    }

    #[tokio::test]
    async fn test_probe_accepts_forbidden_but_not_unauthorized() {
        let forbidden = Router::new().fallback(|| async { StatusCode::FORBIDDEN });
        let base = spawn_http(forbidden).await;
        let mut conn = connection(&base, "", "").await;
        assert!(QbittorrentAdapter::probe(&mut conn).await);

        let unauthorized = Router::new().fallback(|| async { StatusCode::UNAUTHORIZED });
        let base = spawn_http(unauthorized).await;
        let mut conn = connection(&base, "", "").await;
        assert!(!QbittorrentAdapter::probe(&mut conn).await);
    }

    #[tokio::test]
    async fn test_login_skipped_without_username() {
        let recorded = Arc::new(Recorded::default());
        let base = spawn_http(router(recorded.clone())).await;
        let mut conn = connection(&base, "", "").await;

        QbittorrentAdapter.login(&mut conn).await.unwrap();
        assert_eq!(recorded.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_login_accepts_ok_and_rejects_fails() {
        let base = spawn_http(router(Arc::default())).await;

        let mut conn = connection(&base, "admin", "secret").await;
        QbittorrentAdapter.login(&mut conn).await.unwrap();

        let mut conn = connection(&base, "admin", "wrong").await;
        let err = QbittorrentAdapter.login(&mut conn).await.unwrap_err();
        assert!(matches!(err, BackendError::LoginRejected(_)));
    }

    // =========================================================================
    // FETCH
    // =========================================================================

    #[tokio::test]
    async fn test_fetch_torrents_maps_maindata() {
        let base = spawn_http(router(Arc::default())).await;
        let mut conn = connection(&base, "", "").await;

        let mut torrents = QbittorrentAdapter.fetch_torrents(&mut conn).await.unwrap();
        torrents.sort_by(|a, b| a.info_hash.cmp(&b.info_hash));

        assert_eq!(
            torrents,
            vec![
                TorrentSnapshot::new("aaa", 2, 1000),
                TorrentSnapshot::new("bbb", 0, 5),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_peers_passes_hash() {
        let recorded = Arc::new(Recorded::default());
        let base = spawn_http(router(recorded.clone())).await;
        let mut conn = connection(&base, "", "").await;

        let peers = QbittorrentAdapter
            .fetch_torrent_peers(&mut conn, "aaa")
            .await
            .unwrap();

        assert_eq!(
            peers,
            vec![PeerObservation::new("1.2.3.4", 6881, "qBittorrent 4.6", 0.25, 4096)]
        );
        let queries = recorded.peer_queries.lock().unwrap();
        assert_eq!(queries[0].get("hash").map(String::as_str), Some("aaa"));
        assert_eq!(queries[0].get("rid").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn test_missing_torrent_is_not_found() {
        let base = spawn_http(Router::new()).await;
        let mut conn = connection(&base, "", "").await;

        let err = QbittorrentAdapter
            .fetch_torrent_peers(&mut conn, "gone")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport(TransportError::NotFound)));
    }

    #[tokio::test]
    async fn test_forbidden_triggers_relogin_then_fails() {
        let recorded = Arc::new(Recorded::default());
        let app = Router::new()
            .route(
                "/api/v2/auth/login",
                post(|State(rec): State<Arc<Recorded>>| async move {
                    rec.logins.fetch_add(1, Ordering::SeqCst);
                    "Ok."
                }),
            )
            .route(
                "/api/v2/sync/maindata",
                get(|| async { StatusCode::FORBIDDEN }),
            )
            .with_state(recorded.clone());
        let base = spawn_http(app).await;
        let mut conn = connection(&base, "admin", "secret").await;

        let err = QbittorrentAdapter.fetch_torrents(&mut conn).await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(TransportError::Forbidden)));
        assert_eq!(recorded.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let app = Router::new().route("/api/v2/sync/maindata", get(|| async { "not json" }));
        let base = spawn_http(app).await;
        let mut conn = connection(&base, "", "").await;

        let err = QbittorrentAdapter.fetch_torrents(&mut conn).await.unwrap_err();
        assert!(matches!(err, BackendError::Decode { what: "maindata", .. }));
    }

    // =========================================================================
    // SUBMIT
    // =========================================================================

    #[tokio::test]
    async fn test_submit_sends_newline_joined_ips() {
        let recorded = Arc::new(Recorded::default());
        let base = spawn_http(router(recorded.clone())).await;
        let mut conn = connection(&base, "", "").await;

        let mut table = BanTable::new(BanMethod::Extended);
        table.ban("5.6.7.8", PortSelector::ExactPort(1), Timestamp::new(1));
        table.ban("1.2.3.4", PortSelector::Wildcard, Timestamp::new(1));
        QbittorrentAdapter.submit_bans(&mut conn, &table).await.unwrap();

        let sent = recorded.preferences.lock().unwrap();
        let json: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(json["banned_IPs"], "1.2.3.4\n5.6.7.8");
    }

    #[tokio::test]
    async fn test_submit_empty_table_clears_list() {
        let recorded = Arc::new(Recorded::default());
        let base = spawn_http(router(recorded.clone())).await;
        let mut conn = connection(&base, "", "").await;

        QbittorrentAdapter
            .submit_bans(&mut conn, &BanTable::default())
            .await
            .unwrap();

        let sent = recorded.preferences.lock().unwrap();
        assert_eq!(sent[0], r#"{"banned_IPs":""}"#);
    }
}
