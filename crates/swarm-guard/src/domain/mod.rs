//! Domain Layer - Pure ban decision logic with no I/O
//!
//! This module contains:
//! - Snapshot entities read from the torrent client
//! - The ban table and its port-aware matching
//! - Rotating per-IP windows used for window-over-window deltas
//! - The heuristics and the Decision Engine that applies them

pub mod ban_table;
pub mod blocklist;
pub mod config;
pub mod engine;
pub mod entities;
pub mod heuristics;
pub mod value_objects;
pub mod windows;

pub use ban_table::*;
pub use blocklist::*;
pub use config::*;
pub use engine::*;
pub use entities::*;
pub use value_objects::*;
pub use windows::*;
