//! # Swarm Guard
//!
//! Watches the peers of a BitTorrent client (qBittorrent or Transmission)
//! through its Web API and bans leechers that misbehave: blocklisted client
//! names, peers whose reported progress does not match what we uploaded to
//! them, IPs pulling too much data per window and IPs spraying connections
//! over many ports.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** Pure ban logic (ban table, sliding windows, heuristics,
//!   Decision Engine). No I/O.
//! - **Ports Layer:** `TorrentBackend`, `TimeSource`, `ConfigSource`
//! - **Transport:** Session-resilient HTTP client (cookies, CSRF token,
//!   status classification)
//! - **Adapters Layer:** qBittorrent and Transmission backends, system clock,
//!   TOML config file
//! - **Service Layer:** The poll scheduler driving one cycle per tick
//!
//! ## Example
//!
//! ```rust
//! use swarm_guard::{DecisionEngine, EngineConfig, PeerObservation, PeerVerdict, Timestamp};
//! use swarm_guard::Blocklist;
//!
//! let (blocklist, _rejected) = Blocklist::compile(&["^-XL0012-"]);
//! let mut engine = DecisionEngine::new(EngineConfig {
//!     blocklist,
//!     ..EngineConfig::default()
//! });
//!
//! let peer = PeerObservation::new("8.8.8.8", 6881, "-XL0012-1.0", 0.1, 0);
//! let verdict = engine.evaluate_peer(&peer, "infohash", 1 << 30, Timestamp::new(1000));
//!
//! assert!(matches!(verdict, PeerVerdict::BannedClient { .. }));
//! assert!(engine.ban_table().contains("8.8.8.8"));
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// =============================================================================
// I/O MODULES
// =============================================================================

/// Session-resilient HTTP transport.
pub mod transport;

/// Torrent client backends, clock and config file.
pub mod adapters;

/// Test utilities (FixedTimeSource, StaticConfigSource)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

// Domain
pub use domain::{
    BanEntry, BanMethod, BanReason, BanTable, Blocklist, ClientStatReport, DecisionEngine,
    EngineConfig, MalformedReason, PeerObservation, PeerVerdict, PortSelector, Timestamp,
    TorrentSnapshot, WindowBan,
};

// Configuration
pub use config::{ClientKind, ConfigError, GuardConfig};

// Ports
pub use ports::{BackendError, ConfigSource, TimeSource, TorrentBackend};

// Transport
pub use transport::{RequestOptions, SessionTransport, TransportError};

// Adapters
pub use adapters::{Backend, SystemTimeSource, TomlConfigSource};

// Service
pub use service::{CycleReport, GuardScheduler, SchedulerState};
