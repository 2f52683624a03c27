//! # RTS Kit Diagnostics
//!
//! Logging setup and statistics tracking for RTS Kit sessions.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod stats;

// Re-export main types
pub use logging::{init_logging, DEFAULT_FILTER};
pub use stats::{StatsHistory, TimestampedStats, ViewerActivity, DEFAULT_STATS_CAPACITY};
