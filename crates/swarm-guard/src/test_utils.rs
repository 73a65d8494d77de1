//! Test utilities for the guard.
//!
//! Deterministic stand-ins for the clock and the configuration source.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use swarm_guard::test_utils::FixedTimeSource;
//! use swarm_guard::ports::TimeSource;
//!
//! let time_source = FixedTimeSource::new(1000);
//! time_source.advance(5);
//! assert_eq!(time_source.now().as_secs(), 1005);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{ConfigError, GuardConfig};
use crate::domain::Timestamp;
use crate::ports::{ConfigSource, TimeSource};

/// A time source that only moves when told to.
///
/// Clones share the same clock, so a test can keep a handle after moving
/// one into the scheduler.
#[derive(Debug, Clone, Default)]
pub struct FixedTimeSource {
    timestamp: Arc<AtomicU64>,
}

impl FixedTimeSource {
    /// Create a new fixed time source with the given timestamp (in seconds).
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp: Arc::new(AtomicU64::new(timestamp)),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp.load(Ordering::SeqCst)
    }

    pub fn set(&self, timestamp: u64) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.timestamp.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.timestamp())
    }
}

/// Config source fed by the test. Each published config is returned once.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    next: Arc<Mutex<Option<GuardConfig>>>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `config` the result of the next poll.
    pub fn publish(&self, config: GuardConfig) {
        if let Ok(mut next) = self.next.lock() {
            *next = Some(config);
        }
    }
}

impl ConfigSource for StaticConfigSource {
    fn poll(&mut self) -> Result<Option<GuardConfig>, ConfigError> {
        Ok(self.next.lock().ok().and_then(|mut next| next.take()))
    }
}

/// Serve `router` on an ephemeral local port and return its base URL.
#[cfg(test)]
pub(crate) async fn spawn_http(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
