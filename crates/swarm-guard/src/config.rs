//! # Guard Configuration
//!
//! The on-disk TOML model. Every key is optional; missing keys take the
//! defaults below. After parsing, [`GuardConfig::normalize`] applies the
//! floors the rest of the crate relies on:
//!
//! - `poll_interval >= 1`
//! - `request_timeout_sec >= 1`
//! - `ban_duration >= clean_interval` and `ban_duration >= 1`
//! - window intervals `>= 1`
//!
//! ```toml
//! poll_interval = 2
//! client_url = "http://127.0.0.1:8080"
//! client_username = "admin"
//! client_password = "adminadmin"
//! extended_ban_method = true
//! max_ports_per_ip = 3
//! blocklist = ["^-XL0012-", "Xunlei"]
//!
//! [progress_upload_check]
//! enabled = true
//! start_percent = 2
//! start_mb = 20
//! anti_error_ratio = 3
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::config::non_negative;
use crate::domain::{
    BanMethod, Blocklist, EngineConfig, IpUploadCheck, ProgressUploadCheck, RelativeUploadCheck,
};

/// Errors while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Torrent client family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Qbittorrent,
    Transmission,
}

impl ClientKind {
    /// Parse a `client_type` value. Empty means auto-detect.
    pub fn parse(value: &str) -> Result<Option<Self>, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "qbittorrent" => Ok(Some(Self::Qbittorrent)),
            "transmission" => Ok(Some(Self::Transmission)),
            other => Err(ConfigError::Invalid {
                key: "client_type",
                reason: format!("unsupported client {other:?}"),
            }),
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Qbittorrent => write!(f, "qBittorrent"),
            Self::Transmission => write!(f, "Transmission"),
        }
    }
}

/// Full configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub debug: bool,
    /// Seconds between scheduler ticks.
    #[serde(deserialize_with = "non_negative::deserialize")]
    pub poll_interval: u64,
    /// Seconds between expiry sweeps; `<= 0` sweeps every tick.
    pub clean_interval: i64,
    /// Seconds a ban lives after its last refresh.
    #[serde(deserialize_with = "non_negative::deserialize")]
    pub ban_duration: u64,
    /// Pause between per-torrent peer fetches.
    #[serde(deserialize_with = "non_negative::deserialize")]
    pub inter_torrent_delay_ms: u64,
    #[serde(deserialize_with = "non_negative::deserialize")]
    pub request_timeout_sec: u64,
    pub extended_ban_method: bool,
    pub max_ports_per_ip: i64,
    pub blocklist: Vec<String>,
    /// `"qBittorrent"`, `"Transmission"` or empty for auto-detection.
    pub client_type: String,
    pub client_url: String,
    pub client_username: String,
    pub client_password: String,
    pub use_basic_auth: bool,
    /// Where the Transmission P2P blocklist is written.
    pub transmission_blocklist_path: PathBuf,
    /// URL Transmission fetches the blocklist from.
    pub transmission_blocklist_url: String,
    pub client_stat_interval: i64,
    #[serde(rename = "progress_upload_check")]
    pub progress_upload: ProgressUploadCheck,
    #[serde(rename = "relative_progress_upload_check")]
    pub relative_upload: RelativeUploadCheck,
    #[serde(rename = "ip_upload_check")]
    pub ip_upload: IpUploadCheck,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            debug: false,
            poll_interval: 2,
            clean_interval: 3_600,
            ban_duration: 86_400,
            inter_torrent_delay_ms: 100,
            request_timeout_sec: 30,
            extended_ban_method: false,
            max_ports_per_ip: 0,
            blocklist: Vec::new(),
            client_type: String::new(),
            client_url: "http://127.0.0.1:990".to_string(),
            client_username: String::new(),
            client_password: String::new(),
            use_basic_auth: false,
            transmission_blocklist_path: PathBuf::from("swarm-guard-blocklist.p2p"),
            transmission_blocklist_url: String::new(),
            client_stat_interval: 0,
            progress_upload: ProgressUploadCheck::default(),
            relative_upload: RelativeUploadCheck::default(),
            ip_upload: IpUploadCheck::default(),
        }
    }
}

impl GuardConfig {
    /// Parse, validate and normalize a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    /// Reject values that cannot be clamped into something usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ClientKind::parse(&self.client_type)?;
        if self.client_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "client_url",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Apply the value floors.
    pub fn normalize(&mut self) {
        self.poll_interval = self.poll_interval.max(1);
        self.request_timeout_sec = self.request_timeout_sec.max(1);
        if self.clean_interval > 0 {
            self.ban_duration = self.ban_duration.max(self.clean_interval as u64);
        }
        self.ban_duration = self.ban_duration.max(1);
        self.relative_upload.window_interval = self.relative_upload.window_interval.max(1);
        self.ip_upload.window_interval = self.ip_upload.window_interval.max(1);
        self.client_url = self.client_url.trim().trim_end_matches('/').to_string();
    }

    /// Explicit client override, if any.
    pub fn client_kind(&self) -> Option<ClientKind> {
        ClientKind::parse(&self.client_type).ok().flatten()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    pub fn inter_torrent_delay(&self) -> Duration {
        Duration::from_millis(self.inter_torrent_delay_ms)
    }

    /// Build the engine's view, compiling the blocklist.
    ///
    /// Patterns that fail to compile are logged and skipped.
    pub fn engine_config(&self) -> EngineConfig {
        let (blocklist, rejected) = Blocklist::compile(&self.blocklist);
        for reject in &rejected {
            warn!(pattern = %reject.pattern, error = %reject.error, "Skipping invalid blocklist pattern");
        }
        if !self.blocklist.is_empty() {
            info!(rules = blocklist.len(), "Loaded blocklist rules");
        }

        EngineConfig {
            ban_method: BanMethod::from_extended_flag(self.extended_ban_method),
            ban_duration: self.ban_duration,
            clean_interval: self.clean_interval,
            max_ports_per_ip: self.max_ports_per_ip,
            client_stat_interval: self.client_stat_interval,
            blocklist,
            progress_upload: self.progress_upload.clone(),
            relative_upload: self.relative_upload.clone(),
            ip_upload: self.ip_upload.clone(),
        }
    }

    /// Log the effective configuration. The password is never printed.
    pub fn log_summary(&self) {
        info!(
            client_url = %self.client_url,
            client_type = %self.client_kind().map_or_else(|| "auto".to_string(), |k| k.to_string()),
            username = %self.client_username,
            password = if self.client_password.is_empty() { "" } else { "<redacted>" },
            basic_auth = self.use_basic_auth,
            poll_interval = self.poll_interval,
            clean_interval = self.clean_interval,
            ban_duration = self.ban_duration,
            request_timeout_sec = self.request_timeout_sec,
            extended_ban_method = self.extended_ban_method,
            max_ports_per_ip = self.max_ports_per_ip,
            blocklist = self.blocklist.len(),
            progress_upload_check = self.progress_upload.enabled,
            relative_upload_check = self.relative_upload.enabled,
            ip_upload_check = self.ip_upload.enabled,
            "Configuration loaded"
        );
    }
}
