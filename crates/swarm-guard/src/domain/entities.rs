//! Core domain entities: snapshots read from the client and the ban entry.

use std::fmt;
use std::net::IpAddr;

/// Seconds since the Unix epoch, as seen by the scheduler clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Maximum reasonable timestamp (year 9999).
    pub const MAX_REASONABLE: u64 = 253_402_300_799;

    /// Create a new timestamp, clamping to MAX_REASONABLE.
    pub fn new(secs: u64) -> Self {
        Self(secs.min(Self::MAX_REASONABLE))
    }

    /// Get the underlying seconds value.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Add seconds to timestamp (saturating at MAX_REASONABLE).
    pub fn add_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs).min(Self::MAX_REASONABLE))
    }

    /// Subtract seconds from timestamp (saturating at 0).
    pub fn sub_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }

    /// True once `interval` seconds have strictly passed since `self`.
    pub fn has_elapsed(&self, interval: u64, now: Timestamp) -> bool {
        self.add_secs(interval) < now
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One torrent as reported by the controlled client for the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentSnapshot {
    /// Identifying hash; may be empty when the client reports garbage.
    pub info_hash: String,
    /// Number of peers still downloading from us.
    pub leecher_count: i64,
    /// Total payload size in bytes.
    pub total_size_bytes: i64,
}

impl TorrentSnapshot {
    pub fn new(info_hash: impl Into<String>, leecher_count: i64, total_size_bytes: i64) -> Self {
        Self {
            info_hash: info_hash.into(),
            leecher_count,
            total_size_bytes,
        }
    }
}

/// One peer of one torrent as reported by the controlled client.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerObservation {
    pub ip: String,
    pub port: u16,
    pub client_name: String,
    /// Self-reported completion in `0.0..=1.0`.
    pub progress: f64,
    /// Bytes we have uploaded to this peer in the current session.
    pub uploaded_bytes: i64,
}

impl PeerObservation {
    pub fn new(
        ip: impl Into<String>,
        port: u16,
        client_name: impl Into<String>,
        progress: f64,
        uploaded_bytes: i64,
    ) -> Self {
        Self {
            ip: ip.into(),
            port,
            client_name: client_name.into(),
            progress,
            uploaded_bytes,
        }
    }
}

/// Which ports of an IP a ban entry covers.
///
/// Both wildcard variants match every port; the relative variant only exists
/// so reports can tell the relative-upload rule apart from the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortSelector {
    /// Any port of the IP.
    Wildcard,
    /// Any port of the IP, raised by the relative-upload rule.
    RelativeUploadWildcard,
    /// Exactly this port (only meaningful under the extended ban method).
    ExactPort(u16),
}

impl PortSelector {
    /// True for both wildcard variants.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard | Self::RelativeUploadWildcard)
    }

    /// Port-aware match. `None` asks "is the whole IP banned?".
    pub fn covers(&self, port: Option<u16>) -> bool {
        match (self, port) {
            (Self::Wildcard | Self::RelativeUploadWildcard, _) => true,
            (Self::ExactPort(banned), Some(port)) => *banned == port,
            (Self::ExactPort(_), None) => false,
        }
    }
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wildcard => write!(f, "*"),
            Self::RelativeUploadWildcard => write!(f, "*(relative)"),
            Self::ExactPort(port) => write!(f, "{}", port),
        }
    }
}

/// A live ban for one IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    /// Lowercase-normalized address.
    pub ip: String,
    pub selector: PortSelector,
    /// Last time the ban was raised or refreshed.
    pub banned_at: Timestamp,
}

/// Lowercase an address for use as a ban/window key.
pub fn normalize_ip(ip: &str) -> String {
    ip.trim().to_ascii_lowercase()
}

/// Private-range check: 10/8, 172.16/12, 192.168/16 and fc00::/7.
///
/// Loopback and link-local are not private here.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}
