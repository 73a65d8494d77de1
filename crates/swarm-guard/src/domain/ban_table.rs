//! The ban table: at most one live entry per normalized IP.

use std::collections::HashMap;

use super::{normalize_ip, BanEntry, BanMethod, PortSelector, Timestamp};

/// Tracks banned IPs and the time each ban was last refreshed.
#[derive(Debug, Clone, Default)]
pub struct BanTable {
    entries: HashMap<String, BanEntry>,
    method: BanMethod,
}

impl BanTable {
    /// Create an empty table matching with `method`.
    pub fn new(method: BanMethod) -> Self {
        Self {
            entries: HashMap::new(),
            method,
        }
    }

    pub fn method(&self) -> BanMethod {
        self.method
    }

    /// Switch matching method; existing entries are kept as-is.
    pub fn set_method(&mut self, method: BanMethod) {
        self.method = method;
    }

    /// Insert or overwrite the entry for `ip`.
    pub fn ban(&mut self, ip: &str, selector: PortSelector, now: Timestamp) {
        let ip = normalize_ip(ip);
        self.entries.insert(
            ip.clone(),
            BanEntry {
                ip,
                selector,
                banned_at: now,
            },
        );
    }

    /// Find the entry blocking `ip:port` without touching it.
    ///
    /// `port == None` is a wildcard lookup: under the extended method it only
    /// matches wildcard entries.
    pub fn matching(&self, ip: &str, port: Option<u16>) -> Option<PortSelector> {
        let entry = self.entries.get(&normalize_ip(ip))?;
        match self.method {
            BanMethod::Legacy => Some(entry.selector),
            BanMethod::Extended => entry.selector.covers(port).then_some(entry.selector),
        }
    }

    /// Check whether `ip:port` is blocked.
    pub fn is_blocked(&self, ip: &str, port: Option<u16>) -> bool {
        self.matching(ip, port).is_some()
    }

    /// Like [`matching`](Self::matching), but slides the matched entry's
    /// `banned_at` forward to `refresh_at` when given. Never moves it back.
    pub fn lookup(
        &mut self,
        ip: &str,
        port: Option<u16>,
        refresh_at: Option<Timestamp>,
    ) -> Option<PortSelector> {
        let selector = self.matching(ip, port)?;
        if let Some(now) = refresh_at {
            if let Some(entry) = self.entries.get_mut(&normalize_ip(ip)) {
                entry.banned_at = entry.banned_at.max(now);
            }
        }
        Some(selector)
    }

    /// True if `ip` has any entry, whatever its selector.
    pub fn contains(&self, ip: &str) -> bool {
        self.entries.contains_key(&normalize_ip(ip))
    }

    pub fn get(&self, ip: &str) -> Option<&BanEntry> {
        self.entries.get(&normalize_ip(ip))
    }

    /// Remove every entry whose `banned_at + ban_duration < now`.
    pub fn clear_expired(&mut self, now: Timestamp, ban_duration: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.banned_at.has_elapsed(ban_duration, now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BanEntry> {
        self.entries.values()
    }

    /// Banned IPs in stable order, for pushing to the client.
    pub fn sorted_ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.entries.keys().cloned().collect();
        ips.sort();
        ips
    }
}
