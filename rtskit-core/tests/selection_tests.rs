//! Integration tests for cyclic selection and the state machines

use rtskit_core::*;

// ============================================================================
// Cyclic Selection
// ============================================================================

#[test]
fn test_out_of_range_requests_are_repaired() {
    let mut codecs = CyclicSelection::new(vec!["opus", "multiopus"]);

    for requested in [-100i64, -1, 0, 1, 2, 3, 99] {
        let resolved = codecs.select(requested).unwrap();
        assert_eq!(resolved as i64, requested.clamp(0, 1));
        assert_eq!(codecs.index(), Some(resolved));
    }
}

#[test]
fn test_empty_list_yields_no_selection() {
    let mut playback: CyclicSelection<String> = CyclicSelection::default();
    assert!(playback.is_empty());
    assert_eq!(playback.select(3), None);
    assert_eq!(playback.selected(), None);
    assert_eq!(playback.next(false), None);
    assert_eq!(playback.next_matching(true, |_| true), None);
}

#[test]
fn test_stepping_forward_len_times_returns_to_start() {
    let items: Vec<u32> = (0..5).collect();
    for start in 0..5i64 {
        let mut selection = CyclicSelection::with_index(items.clone(), start);
        for _ in 0..items.len() {
            let next = selection.next(true).unwrap();
            selection.select(next as i64);
        }
        assert_eq!(selection.index(), Some(start as usize));
    }
}

#[test]
fn test_stepping_backward_wraps() {
    let selection = CyclicSelection::with_index(vec!['a', 'b', 'c'], 0);
    assert_eq!(selection.next(false), Some(2));
    assert_eq!(selection.next(true), Some(1));
}

#[test]
fn test_selection_survives_list_refresh() {
    let mut sources = CyclicSelection::with_index(vec!["cam0", "cam1", "ndi0"], 2);
    assert_eq!(sources.set_items(vec!["cam0", "cam1"]), Some(1));
    assert_eq!(sources.selected(), Some(&"cam1"));

    assert_eq!(sources.set_items(Vec::new()), None);
    assert_eq!(sources.set_items(vec!["cam0", "cam1", "cam2"]), Some(1));
}

#[test]
fn test_selection_serialization() {
    let selection = CyclicSelection::with_index(vec![1u8, 2, 3], 1);
    let json = serde_json::to_string(&selection).unwrap();
    let restored: CyclicSelection<u8> = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, selection);
}

// ============================================================================
// State Machines
// ============================================================================

#[test]
fn test_publish_lifecycle_is_closed() {
    use PublishState::*;
    let path = [Disconnected, Connecting, Connected, Publishing, Connected, Disconnected];
    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
    }
    assert!(!Publishing.can_transition_to(Connecting));
    assert!(!Disconnected.can_transition_to(Connected));
}

#[test]
fn test_subscribe_lifecycle_is_closed() {
    use SubscribeState::*;
    let path = [Disconnected, Connecting, Connected, Subscribing, Connected, Disconnected];
    for pair in path.windows(2) {
        assert!(pair[0].can_transition_to(pair[1]));
    }
    assert!(!Subscribing.can_transition_to(Subscribing));
}

#[test]
fn test_capture_lifecycle_is_closed() {
    use CaptureState::*;
    assert!(NotCaptured.can_transition_to(TryCapture));
    assert!(TryCapture.can_transition_to(NotCaptured));
    assert!(IsCaptured.can_transition_to(NotCaptured));
    assert!(!IsCaptured.can_transition_to(TryCapture));
}

#[test]
fn test_session_state_defaults() {
    let state = SessionState::default();
    assert_eq!(state.publish, PublishState::Disconnected);
    assert_eq!(state.subscribe, SubscribeState::Disconnected);
    assert!(!state.is_capturing());
    assert_eq!(state.publish.to_string(), "Disconnected");
}
