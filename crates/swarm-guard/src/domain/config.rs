//! Decision-engine tuning knobs.

use serde::Deserialize;

use super::{BanMethod, Blocklist};

/// Reads a signed integer and clamps negatives to zero, so an out-of-range
/// interval is floored afterwards instead of rejecting the whole file.
pub(crate) mod non_negative {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(value.max(0).unsigned_abs())
    }
}

/// Absolute progress/upload heuristic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProgressUploadCheck {
    pub enabled: bool,
    /// Upload must reach this share of the torrent size (percent).
    pub start_percent: f64,
    /// Upload must reach this many MiB.
    pub start_mb: f64,
    /// Multiplier applied to the peer's reported download before comparing.
    pub anti_error_ratio: f64,
}

impl Default for ProgressUploadCheck {
    fn default() -> Self {
        Self {
            enabled: false,
            start_percent: 2.0,
            start_mb: 20.0,
            anti_error_ratio: 3.0,
        }
    }
}

/// Window-over-window progress/upload heuristic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelativeUploadCheck {
    pub enabled: bool,
    /// Upload growth between windows must exceed this many MiB.
    pub start_mb: f64,
    /// `last / current` upload must exceed this (percent).
    pub start_percent: f64,
    pub anti_error_ratio: f64,
    /// Seconds per peer window. Also drives the port-count check.
    #[serde(deserialize_with = "non_negative::deserialize")]
    pub window_interval: u64,
}

impl Default for RelativeUploadCheck {
    fn default() -> Self {
        Self {
            enabled: false,
            start_mb: 20.0,
            start_percent: 2.0,
            anti_error_ratio: 3.0,
            window_interval: 60,
        }
    }
}

/// Aggregate per-IP upload increment heuristic.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IpUploadCheck {
    pub enabled: bool,
    /// Ban when one window's upload increment exceeds this many MiB.
    pub increment_mb: f64,
    /// Seconds per IP window.
    #[serde(deserialize_with = "non_negative::deserialize")]
    pub window_interval: u64,
}

impl Default for IpUploadCheck {
    fn default() -> Self {
        Self {
            enabled: false,
            increment_mb: 38_000.0,
            window_interval: 300,
        }
    }
}

/// Everything the decision engine needs, already normalized.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ban_method: BanMethod,
    /// Seconds a ban lives after its last refresh (at least 1).
    pub ban_duration: u64,
    /// Seconds between expiry sweeps; `<= 0` sweeps on every call.
    pub clean_interval: i64,
    /// `<= 0` disables the port-count check.
    pub max_ports_per_ip: i64,
    /// Seconds per client-statistics window; `<= 0` disables the report.
    pub client_stat_interval: i64,
    pub blocklist: Blocklist,
    pub progress_upload: ProgressUploadCheck,
    pub relative_upload: RelativeUploadCheck,
    pub ip_upload: IpUploadCheck,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ban_method: BanMethod::Legacy,
            ban_duration: 86_400,
            clean_interval: 3_600,
            max_ports_per_ip: 0,
            client_stat_interval: 0,
            blocklist: Blocklist::default(),
            progress_upload: ProgressUploadCheck::default(),
            relative_upload: RelativeUploadCheck::default(),
            ip_upload: IpUploadCheck::default(),
        }
    }
}
