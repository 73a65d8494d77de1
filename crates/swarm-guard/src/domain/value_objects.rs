//! Value objects shared by the decision engine and the scheduler.

use std::fmt;

use super::PortSelector;

/// Bytes per mebibyte; every `*_mb` threshold is measured in MiB.
pub const MIB: f64 = 1024.0 * 1024.0;

/// How ban entries are matched against observed peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BanMethod {
    /// Any entry for an IP blocks every port of that IP.
    #[default]
    Legacy,
    /// Entries carry a port selector; exact-port entries block only that port.
    Extended,
}

impl BanMethod {
    pub fn from_extended_flag(extended: bool) -> Self {
        if extended {
            Self::Extended
        } else {
            Self::Legacy
        }
    }
}

/// Why a ban was raised.
#[derive(Debug, Clone, PartialEq)]
pub enum BanReason {
    /// Uploaded far more than the peer's reported progress accounts for.
    ProgressUpload,
    /// Client name matched a blocklist pattern.
    Blocklist { pattern: String },
    /// Aggregate upload to the IP grew past the per-window increment.
    IpUploadIncrement { increment_mb: f64 },
    /// Too many distinct ports seen for the IP in one window.
    TooManyPorts { ports: usize },
    /// Window-over-window upload outpaced window-over-window progress.
    RelativeUpload,
}

impl fmt::Display for BanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProgressUpload => write!(f, "progress/upload mismatch"),
            Self::Blocklist { pattern } => write!(f, "client blocklist ({})", pattern),
            Self::IpUploadIncrement { increment_mb } => {
                write!(f, "ip upload increment ({:.2} MiB)", increment_mb)
            }
            Self::TooManyPorts { ports } => write!(f, "too many ports ({})", ports),
            Self::RelativeUpload => write!(f, "relative progress/upload mismatch"),
        }
    }
}

/// Why a peer record was skipped without evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    EmptyIp,
    EmptyClientName,
    UnparsableIp,
    PrivateIp,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyIp => write!(f, "empty ip"),
            Self::EmptyClientName => write!(f, "empty client name"),
            Self::UnparsableIp => write!(f, "unparsable ip"),
            Self::PrivateIp => write!(f, "private ip"),
        }
    }
}

/// Outcome of evaluating one peer observation.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerVerdict {
    /// No rule fired; the peer was recorded into the windows.
    Ok,
    /// A live entry already covers the peer; its TTL was refreshed.
    AlreadyBanned(PortSelector),
    /// Banned by the absolute progress/upload heuristic.
    BannedProgress,
    /// Banned by the client-name blocklist.
    BannedClient { pattern: String },
    /// Record skipped.
    Malformed(MalformedReason),
}

impl PeerVerdict {
    /// True when this verdict added a new ban.
    pub fn is_new_ban(&self) -> bool {
        matches!(self, Self::BannedProgress | Self::BannedClient { .. })
    }
}

/// One ban raised by a window-level check.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBan {
    pub ip: String,
    pub selector: PortSelector,
    pub reason: BanReason,
}
