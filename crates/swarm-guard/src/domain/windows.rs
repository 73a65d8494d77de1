//! Sliding-window state keyed by IP.
//!
//! Each window keeps the map being filled this window plus the map of the
//! window before it, so checks can compute window-over-window deltas.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::Timestamp;

/// Cumulative upload to one IP, per torrent, within a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IpAggregate {
    pub torrent_uploaded: HashMap<String, i64>,
}

impl IpAggregate {
    /// Sum of `self - last` across every torrent in `self`; torrents missing
    /// from `last` count from zero.
    pub fn uploaded_since(&self, last: Option<&IpAggregate>) -> i64 {
        self.torrent_uploaded
            .iter()
            .map(|(info_hash, uploaded)| {
                let previous = last
                    .and_then(|l| l.torrent_uploaded.get(info_hash))
                    .copied()
                    .unwrap_or(0);
                uploaded.saturating_sub(previous)
            })
            .fold(0i64, i64::saturating_add)
    }
}

/// Latest observation of one IP within a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerWindowEntry {
    pub last_seen_at: Timestamp,
    pub ports_seen: HashSet<u16>,
    pub progress: f64,
    pub uploaded_bytes: i64,
}

/// Client names one IP presented within a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStatEntry {
    pub client_names_seen: BTreeSet<String>,
}

/// A current/last pair of per-IP maps with its own rotation clock.
#[derive(Debug, Clone)]
pub struct RotatingWindow<V> {
    current: HashMap<String, V>,
    last: HashMap<String, V>,
    started_at: Option<Timestamp>,
}

impl<V> Default for RotatingWindow<V> {
    fn default() -> Self {
        Self {
            current: HashMap::new(),
            last: HashMap::new(),
            started_at: None,
        }
    }
}

impl<V: Default> RotatingWindow<V> {
    /// Entry for `ip` in the current window, created on first use.
    pub fn entry_mut(&mut self, ip: &str) -> &mut V {
        self.current.entry(ip.to_string()).or_default()
    }
}

impl<V> RotatingWindow<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &HashMap<String, V> {
        &self.current
    }

    pub fn last(&self) -> &HashMap<String, V> {
        &self.last
    }

    /// Whether `interval` seconds have passed since the window opened.
    ///
    /// The first call opens the window at `now` and reports not due.
    pub fn is_due(&mut self, interval: u64, now: Timestamp) -> bool {
        match self.started_at {
            None => {
                self.started_at = Some(now);
                false
            }
            Some(started) => started.has_elapsed(interval, now),
        }
    }

    /// Retire the current map as `last` and open an empty window at `now`.
    pub fn rotate(&mut self, now: Timestamp) {
        self.last = std::mem::take(&mut self.current);
        self.started_at = Some(now);
    }
}
