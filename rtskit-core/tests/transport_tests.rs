//! Integration tests for the transport boundary value types

use rtskit_core::*;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_sink_clones_share_one_queue() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let publisher = TransportEventSink::new(SessionSide::Publish, 1, tx.clone());
    let subscriber = TransportEventSink::new(SessionSide::Subscribe, 4, tx);
    let publisher_clone = publisher.clone();

    let handle = tokio::spawn(async move {
        publisher_clone.on_connected();
        publisher_clone.on_stats_report(StatsReport::from_pairs([("rtt_ms", 12.0)]));
    });
    handle.await.unwrap();
    subscriber.on_layers("1", vec![LayerDescriptor::simulcast("h")], vec!["l".into()]);

    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        events.push(envelope);
    }
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event, TransportEvent::Connected);
    assert_eq!(events[0].generation, 1);
    assert_eq!(events[2].side, SessionSide::Subscribe);
    assert_eq!(events[2].generation, 4);
    assert_eq!(events[2].event.event_type(), "layers");
}

#[test]
fn test_sink_delivers_in_order() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink = TransportEventSink::new(SessionSide::Subscribe, 2, tx);

    sink.on_source_added("", vec![SourceTrack::audio("audio0")]);
    sink.on_source_removed("");

    let (first, second) = tokio_test::block_on(async {
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        (first, second)
    });
    assert_eq!(first.event.event_type(), "source_added");
    assert_eq!(second.event.event_type(), "source_removed");
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_value_types_serialize() {
    let layer = LayerDescriptor {
        encoding_id: "m".to_string(),
        temporal_layer_id: Some(2),
        max_temporal_layer_id: Some(2),
        ..Default::default()
    };
    let json = serde_json::to_string(&layer).unwrap();
    let restored: LayerDescriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, layer);

    let creds = PublishCredentials {
        url: "https://director.example/api/director/publish".to_string(),
        stream_name: "demo".to_string(),
        ..Default::default()
    };
    let json = serde_json::to_value(&creds).unwrap();
    assert_eq!(json["stream_name"], "demo");
    assert_eq!(json["source_id_enabled"], false);
}

#[test]
fn test_publish_options_defaults() {
    let options = PublishOptions::default();
    assert!(options.stereo);
    assert_eq!(options.source_id, None);
    assert_eq!(options.bitrate, BitrateSettings::default());
}
