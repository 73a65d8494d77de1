//! # Poll Scheduler
//!
//! Drives the guard: `Idle -> Authenticating -> Polling` and terminal
//! `Stopped`. One cycle at a time; a slow cycle delays the next tick instead
//! of overlapping it.
//!
//! ## Cycle
//!
//! 1. Hot-reload the configuration (a rejected file keeps the previous one)
//! 2. Sweep expired bans
//! 3. Fetch the torrent snapshot; on failure the cycle ends here
//! 4. For every torrent with leechers and a hash: fetch its peers (throttled)
//!    and evaluate each peer
//! 5. Window checks (per-IP increment, per-peer ports and relative upload)
//! 6. Push the full ban table if it changed

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::GuardConfig;
use crate::domain::{ClientStatReport, DecisionEngine, PeerVerdict, Timestamp, TorrentSnapshot};
use crate::ports::{BackendError, ConfigSource, TimeSource, TorrentBackend};

/// Lifecycle of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Authenticating,
    Polling,
    Stopped,
}

/// What one cycle did. Counters feed the per-cycle log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Expired bans removed by this cycle's sweep.
    pub cleaned: usize,
    pub torrents: usize,
    pub skipped_empty_hash: usize,
    pub skipped_no_leechers: usize,
    pub peer_fetch_failures: usize,
    pub peers_evaluated: usize,
    pub malformed_peers: usize,
    pub already_banned: usize,
    /// New bans from per-peer rules and window checks.
    pub banned: usize,
    /// The ban table was pushed to the client.
    pub submitted: bool,
    /// Shutdown was requested between torrents.
    pub aborted: bool,
}

/// Owns the backend, the decision engine and the configuration.
pub struct GuardScheduler<B, T, C> {
    backend: B,
    time: T,
    config_source: C,
    config: GuardConfig,
    engine: DecisionEngine,
    state: SchedulerState,
    /// Table changed since the last successful submit.
    pending_submit: bool,
    shutdown: watch::Receiver<bool>,
}

impl<B, T, C> GuardScheduler<B, T, C>
where
    B: TorrentBackend,
    T: TimeSource,
    C: ConfigSource,
{
    pub fn new(
        backend: B,
        time: T,
        config_source: C,
        config: GuardConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let engine = DecisionEngine::new(config.engine_config());
        Self {
            backend,
            time,
            config_source,
            config,
            engine,
            state: SchedulerState::Idle,
            pending_submit: false,
            shutdown,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    // =========================================================================
    // STARTUP
    // =========================================================================

    /// Detect the client and log in. Failure is fatal for this run.
    ///
    /// On success the client's ban list is cleared by submitting the empty
    /// table, so a cold start does not inherit stale bans.
    pub async fn start(&mut self) -> Result<(), BackendError> {
        self.state = SchedulerState::Authenticating;

        let authenticated = match self.backend.detect().await {
            Ok(()) => self.backend.login().await,
            Err(e) => Err(e),
        };
        if let Err(e) = authenticated {
            error!(client = self.backend.name(), error = %e, "Authentication failed");
            self.state = SchedulerState::Stopped;
            return Err(e);
        }

        if let Err(e) = self.backend.submit_bans(self.engine.ban_table()).await {
            warn!(error = %e, "Failed to clear the client's ban list");
            self.pending_submit = true;
        }

        self.state = SchedulerState::Polling;
        info!(client = self.backend.name(), "Guard started");
        Ok(())
    }

    /// Tick until shutdown. Starts first if still idle.
    pub async fn run(&mut self) -> Result<(), BackendError> {
        if self.state != SchedulerState::Polling {
            self.start().await?;
        }

        let mut period = self.config.poll_interval();
        let mut ticker = new_ticker(period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if self.is_shutdown() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) if report.aborted => break,
                Ok(_) => {}
                // Already logged; the next tick retries.
                Err(e) => debug!(error = %e, "Cycle ended early"),
            }

            if self.config.poll_interval() != period {
                period = self.config.poll_interval();
                ticker = new_ticker(period);
                debug!(seconds = period.as_secs(), "Poll interval changed");
            }
        }

        self.state = SchedulerState::Stopped;
        info!("Guard stopped");
        Ok(())
    }

    // =========================================================================
    // CYCLE
    // =========================================================================

    /// Run one poll cycle.
    ///
    /// Returns the snapshot fetch error when the client could not be read;
    /// nothing but the expiry sweep has happened in that case.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, BackendError> {
        self.reload_config();
        let now = self.time.now();
        let mut report = CycleReport::default();

        if let Some(removed) = self.engine.clear_expired(now) {
            report.cleaned = removed;
            if removed > 0 {
                self.pending_submit = true;
            }
        }

        let torrents = match self.backend.fetch_torrents().await {
            Ok(torrents) => torrents,
            Err(e) => {
                warn!(error = %e, "Failed to fetch torrents, skipping cycle");
                return Err(e);
            }
        };
        report.torrents = torrents.len();

        let completed = self.scan_torrents(&torrents, now, &mut report).await;
        if report.banned > 0 {
            self.pending_submit = true;
        }
        if !completed {
            report.aborted = true;
            info!("Shutdown requested, cycle aborted");
            return Ok(report);
        }

        report.banned += self.engine.check_all_ip(now).len();
        report.banned += self.engine.check_all_peer(now).len();
        if let Some(stats) = self.engine.rotate_client_stats(now) {
            log_client_stats(&stats);
        }

        debug!(
            torrents = report.torrents,
            empty_hash = report.skipped_empty_hash,
            no_leechers = report.skipped_no_leechers,
            peer_fetch_failures = report.peer_fetch_failures,
            peers = report.peers_evaluated,
            malformed = report.malformed_peers,
            already_banned = report.already_banned,
            "Cycle scanned"
        );

        if report.banned > 0 {
            self.pending_submit = true;
        }
        if self.pending_submit {
            report.submitted = self.submit().await;
            info!(
                banned = report.banned,
                cleaned = report.cleaned,
                total = self.engine.ban_table().len(),
                "Ban table updated"
            );
        }

        Ok(report)
    }

    /// Evaluate every eligible torrent. Returns `false` if shutdown cut it short.
    async fn scan_torrents(
        &mut self,
        torrents: &[TorrentSnapshot],
        now: Timestamp,
        report: &mut CycleReport,
    ) -> bool {
        let delay = self.config.inter_torrent_delay();
        let mut fetched_any = false;

        for torrent in torrents {
            if self.is_shutdown() {
                return false;
            }
            if torrent.info_hash.is_empty() {
                report.skipped_empty_hash += 1;
                continue;
            }
            if torrent.leecher_count <= 0 {
                report.skipped_no_leechers += 1;
                continue;
            }

            if fetched_any && !delay.is_zero() {
                tokio::time::sleep(delay).await;
                if self.is_shutdown() {
                    return false;
                }
            }
            fetched_any = true;

            let peers = match self.backend.fetch_torrent_peers(&torrent.info_hash).await {
                Ok(peers) => peers,
                Err(e) => {
                    debug!(info_hash = %torrent.info_hash, error = %e, "Failed to fetch peers");
                    report.peer_fetch_failures += 1;
                    continue;
                }
            };

            for peer in &peers {
                report.peers_evaluated += 1;
                let verdict = self.engine.evaluate_peer(
                    peer,
                    &torrent.info_hash,
                    torrent.total_size_bytes,
                    now,
                );
                match verdict {
                    PeerVerdict::AlreadyBanned(_) => report.already_banned += 1,
                    PeerVerdict::Malformed(reason) => {
                        report.malformed_peers += 1;
                        debug!(ip = %peer.ip, client = %peer.client_name, reason = %reason, "Skipping malformed peer");
                    }
                    ref verdict if verdict.is_new_ban() => report.banned += 1,
                    _ => {}
                }
            }
        }
        true
    }

    /// Push the whole table. A failure keeps the local bans and retries on
    /// the next cycle.
    async fn submit(&mut self) -> bool {
        match self.backend.submit_bans(self.engine.ban_table()).await {
            Ok(()) => {
                self.pending_submit = false;
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to submit bans, will retry next cycle");
                false
            }
        }
    }

    // =========================================================================
    // CONFIGURATION
    // =========================================================================

    fn reload_config(&mut self) {
        match self.config_source.poll() {
            Ok(Some(config)) => self.apply_config(config),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Config reload failed, keeping previous configuration"),
        }
    }

    /// Swap in a new configuration. Bans and windows survive.
    pub fn apply_config(&mut self, config: GuardConfig) {
        if let Err(e) = self.backend.apply_config(&config) {
            warn!(error = %e, "Backend rejected configuration, keeping previous one");
            return;
        }
        config.log_summary();
        self.engine.apply_config(config.engine_config());
        self.config = config;
    }
}

fn new_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn log_client_stats(stats: &ClientStatReport) {
    for (ip, clients) in &stats.multi_client_ips {
        info!(ip = %ip, clients = ?clients, "IP presented several client names");
    }
    debug!(
        ips = stats.ips_seen,
        multi_client = stats.multi_client_ips.len(),
        "Client statistics window rotated"
    );
}
