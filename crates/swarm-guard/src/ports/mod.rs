//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! Driven ports only: the guard exposes no inbound API beyond the scheduler.

pub mod outbound;

pub use outbound::{BackendError, ConfigSource, TimeSource, TorrentBackend};
