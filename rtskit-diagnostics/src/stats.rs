//! Statistics history and viewer activity

use chrono::{DateTime, Utc};
use rtskit_core::StatsReport;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Default number of reports kept per session side
pub const DEFAULT_STATS_CAPACITY: usize = 32;

/// A statistics report with its arrival time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedStats {
    /// When the report was recorded
    pub received_at: DateTime<Utc>,
    /// The report
    pub report: StatsReport,
}

/// Bounded history of statistics reports.
///
/// Recording is ignored while the history is disabled; the oldest report is
/// dropped once `capacity` is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsHistory {
    capacity: usize,
    enabled: bool,
    entries: VecDeque<TimestampedStats>,
}

impl Default for StatsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_CAPACITY)
    }
}

impl StatsHistory {
    /// Create a disabled history holding at most `capacity` reports
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            enabled: false,
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Start accepting reports
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop accepting reports; recorded ones are kept
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Whether reports are accepted
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a report, returning whether it was kept
    pub fn record(&mut self, report: StatsReport) -> bool {
        if !self.enabled {
            debug!("Statistics disabled, dropping report");
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(TimestampedStats {
            received_at: Utc::now(),
            report,
        });
        true
    }

    /// Most recent report
    pub fn latest(&self) -> Option<&TimestampedStats> {
        self.entries.back()
    }

    /// Reports oldest first
    pub fn iter(&self) -> impl Iterator<Item = &TimestampedStats> {
        self.entries.iter()
    }

    /// Number of recorded reports
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of reports kept
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Forget every report
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Audience state reported for a stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerActivity {
    /// Latest viewer count
    pub viewer_count: u32,
    /// Whether the stream is active
    pub active: bool,
    /// When either value last changed
    pub updated_at: Option<DateTime<Utc>>,
}

impl ViewerActivity {
    /// Record a new viewer count
    pub fn set_viewer_count(&mut self, count: u32) {
        self.viewer_count = count;
        self.updated_at = Some(Utc::now());
    }

    /// Record an active/inactive notification
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.updated_at = Some(Utc::now());
    }

    /// Back to no viewers, inactive
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(rtt: f64) -> StatsReport {
        StatsReport::from_pairs([("rtt_ms", rtt)])
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = StatsHistory::new(2);
        history.enable();
        for rtt in [10.0, 20.0, 30.0] {
            assert!(history.record(report(rtt)));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().next().unwrap().report.get("rtt_ms"), Some(20.0));
        assert_eq!(history.latest().unwrap().report.get("rtt_ms"), Some(30.0));
    }

    #[test]
    fn test_disabled_history_drops_reports() {
        let mut history = StatsHistory::default();
        assert_eq!(history.capacity(), DEFAULT_STATS_CAPACITY);
        assert!(!history.record(report(5.0)));
        assert!(history.is_empty());

        history.enable();
        history.record(report(5.0));
        history.disable();
        assert_eq!(history.len(), 1);
        history.clear();
        assert!(history.latest().is_none());
    }

    #[test]
    fn test_viewer_activity() {
        let mut activity = ViewerActivity::default();
        activity.set_viewer_count(12);
        activity.set_active(true);
        assert_eq!(activity.viewer_count, 12);
        assert!(activity.active);
        assert!(activity.updated_at.is_some());

        activity.reset();
        assert_eq!(activity, ViewerActivity::default());
    }
}
