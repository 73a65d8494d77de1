//! # Ban Decision Engine
//!
//! Owns the ban table and every sliding window. The scheduler only calls the
//! entry points below once per cycle:
//!
//! 1. [`DecisionEngine::clear_expired`]
//! 2. [`DecisionEngine::evaluate_peer`] for every peer of every torrent
//! 3. [`DecisionEngine::check_all_ip`] and [`DecisionEngine::check_all_peer`]
//! 4. [`DecisionEngine::rotate_client_stats`]
//!
//! Rules are evaluated in a fixed order and the first one that fires wins.

use std::net::IpAddr;

use tracing::{debug, info};

use super::heuristics::{
    ip_upload_exceeded, ip_upload_increment_mb, progress_upload_exceeded,
    relative_upload_exceeded,
};
use super::{
    is_private_ip, normalize_ip, BanMethod, BanReason, BanTable, ClientStatEntry, EngineConfig,
    IpAggregate, MalformedReason, PeerObservation, PeerVerdict, PeerWindowEntry, PortSelector,
    RotatingWindow, Timestamp, WindowBan,
};

#[cfg(test)]
mod tests;

/// IPs that presented more than one client name within a statistics window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientStatReport {
    /// Distinct IPs seen in the window.
    pub ips_seen: usize,
    /// `(ip, client names)` for every IP with more than one name, sorted by IP.
    pub multi_client_ips: Vec<(String, Vec<String>)>,
}

/// Stateful heuristic evaluator.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: EngineConfig,
    bans: BanTable,
    ip_window: RotatingWindow<IpAggregate>,
    peer_window: RotatingWindow<PeerWindowEntry>,
    client_stats: RotatingWindow<ClientStatEntry>,
    last_clean: Option<Timestamp>,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            bans: BanTable::new(config.ban_method),
            config,
            ip_window: RotatingWindow::new(),
            peer_window: RotatingWindow::new(),
            client_stats: RotatingWindow::new(),
            last_clean: None,
        }
    }

    /// Swap in a reloaded configuration. Windows and bans are kept.
    pub fn apply_config(&mut self, config: EngineConfig) {
        self.bans.set_method(config.ban_method);
        self.config = config;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ban_table(&self) -> &BanTable {
        &self.bans
    }

    pub fn ip_window(&self) -> &RotatingWindow<IpAggregate> {
        &self.ip_window
    }

    pub fn peer_window(&self) -> &RotatingWindow<PeerWindowEntry> {
        &self.peer_window
    }

    pub fn client_stats(&self) -> &RotatingWindow<ClientStatEntry> {
        &self.client_stats
    }

    /// Whether `ip:port` is covered by a live entry; optionally refreshes it.
    pub fn is_blocked(
        &mut self,
        ip: &str,
        port: Option<u16>,
        now: Timestamp,
        update_timestamp: bool,
    ) -> bool {
        self.bans
            .lookup(ip, port, update_timestamp.then_some(now))
            .is_some()
    }

    // =========================================================================
    // PER-PEER EVALUATION
    // =========================================================================

    /// Evaluate one peer of `info_hash`.
    pub fn evaluate_peer(
        &mut self,
        peer: &PeerObservation,
        info_hash: &str,
        torrent_total_size: i64,
        now: Timestamp,
    ) -> PeerVerdict {
        let ip = match validate_ip(peer) {
            Ok(ip) => ip,
            Err(reason) => return PeerVerdict::Malformed(reason),
        };

        if let Some(selector) = self.bans.lookup(&ip, Some(peer.port), Some(now)) {
            debug!(ip = %ip, port = peer.port, client = %peer.client_name, selector = %selector, "Ignoring banned peer");
            return PeerVerdict::AlreadyBanned(selector);
        }

        let progress_check = &self.config.progress_upload;
        if progress_check.enabled
            && progress_upload_exceeded(
                progress_check,
                torrent_total_size,
                peer.progress,
                peer.uploaded_bytes,
            )
        {
            self.ban_peer(&ip, peer, BanReason::ProgressUpload, now);
            return PeerVerdict::BannedProgress;
        }

        let matched = self
            .config
            .blocklist
            .first_match(&peer.client_name)
            .map(str::to_string);
        if let Some(pattern) = matched {
            self.ban_peer(
                &ip,
                peer,
                BanReason::Blocklist {
                    pattern: pattern.clone(),
                },
                now,
            );
            return PeerVerdict::BannedClient { pattern };
        }

        self.record_peer(&ip, peer, info_hash, now);
        PeerVerdict::Ok
    }

    fn ban_peer(&mut self, ip: &str, peer: &PeerObservation, reason: BanReason, now: Timestamp) {
        let selector = match self.config.ban_method {
            BanMethod::Extended => PortSelector::ExactPort(peer.port),
            BanMethod::Legacy => PortSelector::Wildcard,
        };
        info!(
            ip = %ip,
            port = peer.port,
            client = %peer.client_name,
            progress = peer.progress,
            uploaded = peer.uploaded_bytes,
            reason = %reason,
            "Banning peer"
        );
        self.bans.ban(ip, selector, now);
    }

    fn record_peer(&mut self, ip: &str, peer: &PeerObservation, info_hash: &str, now: Timestamp) {
        self.ip_window
            .entry_mut(ip)
            .torrent_uploaded
            .insert(info_hash.to_string(), peer.uploaded_bytes);

        let entry = self.peer_window.entry_mut(ip);
        entry.last_seen_at = now;
        entry.ports_seen.insert(peer.port);
        entry.progress = peer.progress;
        entry.uploaded_bytes = peer.uploaded_bytes;

        if self.config.client_stat_interval > 0 {
            self.client_stats
                .entry_mut(ip)
                .client_names_seen
                .insert(peer.client_name.clone());
        }
    }

    // =========================================================================
    // WINDOW-LEVEL CHECKS
    // =========================================================================

    /// Aggregate upload increment check over the IP window.
    ///
    /// Runs only when the IP window is due; rotates it afterwards.
    pub fn check_all_ip(&mut self, now: Timestamp) -> Vec<WindowBan> {
        let check = self.config.ip_upload.clone();
        if !self.ip_window.is_due(check.window_interval, now) {
            return Vec::new();
        }

        let mut bans = Vec::new();
        if check.enabled && !self.ip_window.last().is_empty() {
            let last = self.ip_window.last();
            for (ip, aggregate) in self.ip_window.current() {
                if self.bans.contains(ip) {
                    continue;
                }
                let increment_mb = ip_upload_increment_mb(aggregate, last.get(ip));
                if ip_upload_exceeded(&check, increment_mb) {
                    bans.push(WindowBan {
                        ip: ip.clone(),
                        selector: PortSelector::Wildcard,
                        reason: BanReason::IpUploadIncrement { increment_mb },
                    });
                }
            }
        }

        self.ip_window.rotate(now);
        self.apply_window_bans(&bans, now);
        bans
    }

    /// Port-count and relative-upload checks over the peer window.
    ///
    /// Runs only when the peer window is due; rotates it afterwards.
    pub fn check_all_peer(&mut self, now: Timestamp) -> Vec<WindowBan> {
        let check = self.config.relative_upload.clone();
        if !self.peer_window.is_due(check.window_interval, now) {
            return Vec::new();
        }

        let max_ports = self.config.max_ports_per_ip;
        let relative_enabled = check.enabled && !self.peer_window.last().is_empty();
        let mut bans = Vec::new();

        let last = self.peer_window.last();
        for (ip, entry) in self.peer_window.current() {
            // Any live entry exempts the IP, including a per-port ban.
            if self.bans.contains(ip) {
                continue;
            }

            let ports = entry.ports_seen.len();
            if max_ports > 0 && ports as i64 > max_ports {
                bans.push(WindowBan {
                    ip: ip.clone(),
                    selector: PortSelector::Wildcard,
                    reason: BanReason::TooManyPorts { ports },
                });
                continue;
            }

            if !relative_enabled {
                continue;
            }
            if let Some(previous) = last.get(ip) {
                if relative_upload_exceeded(&check, previous, entry) {
                    bans.push(WindowBan {
                        ip: ip.clone(),
                        selector: PortSelector::RelativeUploadWildcard,
                        reason: BanReason::RelativeUpload,
                    });
                }
            }
        }

        self.peer_window.rotate(now);
        self.apply_window_bans(&bans, now);
        bans
    }

    fn apply_window_bans(&mut self, bans: &[WindowBan], now: Timestamp) {
        for ban in bans {
            info!(ip = %ban.ip, selector = %ban.selector, reason = %ban.reason, "Banning IP");
            self.bans.ban(&ban.ip, ban.selector, now);
        }
    }

    /// Rotate the client-statistics window when due and report on it.
    ///
    /// Returns `None` when disabled or not yet due.
    pub fn rotate_client_stats(&mut self, now: Timestamp) -> Option<ClientStatReport> {
        let interval = self.config.client_stat_interval;
        if interval <= 0 || !self.client_stats.is_due(interval as u64, now) {
            return None;
        }

        let current = self.client_stats.current();
        let mut multi_client_ips: Vec<(String, Vec<String>)> = current
            .iter()
            .filter(|(_, entry)| entry.client_names_seen.len() > 1)
            .map(|(ip, entry)| {
                (
                    ip.clone(),
                    entry.client_names_seen.iter().cloned().collect(),
                )
            })
            .collect();
        multi_client_ips.sort();

        let report = ClientStatReport {
            ips_seen: current.len(),
            multi_client_ips,
        };
        self.client_stats.rotate(now);
        Some(report)
    }

    // =========================================================================
    // TTL EXPIRY
    // =========================================================================

    /// Purge expired bans when the clean interval has passed.
    ///
    /// Returns `None` when the sweep was not due, else the number removed.
    pub fn clear_expired(&mut self, now: Timestamp) -> Option<usize> {
        let interval = self.config.clean_interval;
        if interval > 0 {
            if let Some(last) = self.last_clean {
                if !last.has_elapsed(interval as u64, now) {
                    return None;
                }
            }
        }

        self.last_clean = Some(now);
        let removed = self.bans.clear_expired(now, self.config.ban_duration);
        if removed > 0 {
            info!(removed, remaining = self.bans.len(), "Cleared expired bans");
        }
        Some(removed)
    }
}

/// Normalize and vet the peer address.
fn validate_ip(peer: &PeerObservation) -> Result<String, MalformedReason> {
    let trimmed = peer.ip.trim().trim_start_matches('[').trim_end_matches(']');
    if trimmed.is_empty() {
        return Err(MalformedReason::EmptyIp);
    }
    if peer.client_name.trim().is_empty() {
        return Err(MalformedReason::EmptyClientName);
    }
    let parsed: IpAddr = trimmed
        .parse()
        .map_err(|_| MalformedReason::UnparsableIp)?;
    if is_private_ip(&parsed) {
        return Err(MalformedReason::PrivateIp);
    }
    Ok(normalize_ip(trimmed))
}
