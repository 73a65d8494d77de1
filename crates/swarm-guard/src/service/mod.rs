//! # Service Layer
//!
//! The poll scheduler that wires the decision engine to a torrent client.

pub mod scheduler;


pub use scheduler::{CycleReport, GuardScheduler, SchedulerState};
