//! Statistics history behaviour seen from a consumer

use rtskit_core::StatsReport;
use rtskit_diagnostics::{init_logging, StatsHistory, ViewerActivity};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_history_survives_serialization() {
    let mut history = StatsHistory::new(4);
    history.enable();
    history.record(StatsReport::from_pairs([("rtt_ms", 42.0), ("bitrate_kbps", 1800.0)]));

    let json = assert_ok!(serde_json::to_string(&history));
    let restored: StatsHistory = assert_ok!(serde_json::from_str(&json));
    assert_eq!(restored.len(), 1);
    assert!(restored.is_enabled());
    assert_eq!(
        restored.latest().unwrap().report.get("bitrate_kbps"),
        Some(1800.0)
    );
}

#[test]
fn test_latest_report_follows_arrival_order() {
    let mut history = StatsHistory::new(3);
    history.enable();
    for rtt in [1.0, 2.0, 3.0, 4.0] {
        history.record(StatsReport::from_pairs([("rtt_ms", rtt)]));
    }

    let rtts: Vec<f64> = history
        .iter()
        .filter_map(|entry| entry.report.get("rtt_ms"))
        .collect();
    assert_eq!(rtts, vec![2.0, 3.0, 4.0]);

    let stamps: Vec<_> = history.iter().map(|entry| entry.received_at).collect();
    assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_viewer_activity_json_shape() {
    let mut activity = ViewerActivity::default();
    activity.set_viewer_count(3);

    let value = assert_ok!(serde_json::to_value(&activity));
    assert_eq!(value["viewer_count"], 3);
    assert_eq!(value["active"], false);
    assert!(value["updated_at"].is_string());
}

#[test]
fn test_logging_filter_is_validated() {
    let error = assert_err!(init_logging(Some("rtskit=verbose")));
    assert_eq!(error.error_code(), "SETTINGS_ERROR");
    assert_ok!(init_logging(Some("rtskit=debug")));
}
