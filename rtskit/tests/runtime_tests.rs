//! Integration tests for the session control task

use rtskit::*;
use rtskit_core::testing::FakeTransportFactory;
use rtskit_media::testing::FakeMediaBackend;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn spawn(factory: &FakeTransportFactory) -> SessionHandle {
    let session = MediaSession::builder()
        .transport(factory.clone())
        .media(FakeMediaBackend::standard())
        .build()
        .unwrap();
    spawn_session(session)
}

#[tokio::test]
async fn test_publish_through_handle() {
    let factory = FakeTransportFactory::new();
    factory.script(|b| b.auto_connect = true);
    let handle = spawn(&factory);

    handle.call(|s| s.start_capture(true, true)).await.unwrap().unwrap();
    assert!(handle.call(|s| s.connect_publisher()).await.unwrap().unwrap());

    let state = timeout(
        WAIT,
        handle.wait_for_state(|state| state.publish == PublishState::Publishing),
    )
    .await
    .expect("publishing in time")
    .unwrap();
    assert_eq!(state.video_capture, CaptureState::IsCaptured);
    assert_eq!(factory.inspect(|s| s.published_tracks.len()), 2);
}

#[tokio::test]
async fn test_snapshot_reflects_finished_call() {
    let factory = FakeTransportFactory::new();
    let handle = spawn(&factory);

    handle
        .call(|s| s.set_stream_name_publish("studio", false))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(handle.snapshot().publish_credentials.stream_name, "studio");

    handle.call(|s| s.toggle_mirror()).await.unwrap();
    assert!(handle.snapshot().mirrored);
}

#[tokio::test]
async fn test_transport_events_reach_observers() {
    let factory = FakeTransportFactory::new();
    factory.script(|b| b.auto_connect = true);
    let handle = spawn(&factory);
    let mut sources = handle.events().filtered(EventFilter::source_only());

    assert!(handle.call(|s| s.connect_subscriber()).await.unwrap().unwrap());
    timeout(
        WAIT,
        handle.wait_for_state(|state| state.subscribe == SubscribeState::Subscribing),
    )
    .await
    .expect("subscribing in time")
    .unwrap();

    assert!(factory.emit_subscriber(TransportEvent::SourceAdded {
        source_id: "stage".to_string(),
        tracks: vec![SourceTrack::video("v")],
    }));
    let event = timeout(WAIT, sources.next()).await.unwrap();
    assert_eq!(
        event,
        Some(SessionEvent::SourceAdded {
            source_id: "stage".to_string()
        })
    );
}

#[tokio::test]
async fn test_stale_callbacks_do_not_resurrect_state() {
    let factory = FakeTransportFactory::new();
    let handle = spawn(&factory);

    assert!(handle.call(|s| s.connect_subscriber()).await.unwrap().unwrap());
    let abandoned = factory.subscriber_sink().unwrap();
    handle.call(|s| s.disconnect_subscriber()).await.unwrap().unwrap();

    assert!(abandoned.on_connected());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = handle.call(|s| s.state()).await.unwrap();
    assert_eq!(state.subscribe, SubscribeState::Disconnected);
    assert_eq!(handle.state().subscribe, SubscribeState::Disconnected);
}

#[tokio::test]
async fn test_shutdown_releases_session() {
    let factory = FakeTransportFactory::new();
    factory.script(|b| b.auto_connect = true);
    let handle = spawn(&factory);

    handle.call(|s| s.start_capture(true, false)).await.unwrap().unwrap();
    handle.call(|s| s.connect_publisher()).await.unwrap().unwrap();
    timeout(
        WAIT,
        handle.wait_for_state(|state| state.publish == PublishState::Publishing),
    )
    .await
    .unwrap()
    .unwrap();

    handle.shutdown().await.unwrap();
    let state = handle.state();
    assert_eq!(state.publish, PublishState::Disconnected);
    assert_eq!(state.audio_capture, CaptureState::NotCaptured);

    let error = handle.call(|s| s.state()).await.unwrap_err();
    assert_eq!(error.error_code(), "CONTROL_LOOP_CLOSED");
    assert!(!error.is_recoverable());
}
