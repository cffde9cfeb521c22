//! Model audio scheduling through a running session.

mod common;

use base64::Engine;
use common::*;
use fala_realtime::{ConnectionState, LiveEvent, TransportBlob};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_segments_play_back_to_back() {
    let mut harness = start(config());
    harness.ready().await;

    harness.speaker.set_clock(1.0);
    for _ in 0..3 {
        harness.remote.push(audio_event(0.2));
    }
    harness.settle().await;

    let started = harness.speaker.started();
    assert_eq!(started.len(), 3);
    assert!((started[0].1 - 1.0).abs() < 1e-9);
    for pair in started.windows(2) {
        let (_, start, duration) = pair[0];
        assert!((start + duration - pair[1].1).abs() < 1e-9);
    }
    assert_eq!(harness.handle.snapshot().active_segments, 3);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_stops_all_active_segments() {
    let mut harness = start(config());
    harness.ready().await;

    for _ in 0..3 {
        harness.remote.push(audio_event(0.5));
    }
    harness.settle().await;
    assert_eq!(harness.handle.snapshot().active_segments, 3);

    harness.remote.push(LiveEvent::Interrupted);
    harness.settle().await;

    assert_eq!(harness.handle.snapshot().active_segments, 0);
    let mut stopped = harness.speaker.stopped();
    stopped.sort_unstable();
    let mut ids: Vec<_> = harness.speaker.started().iter().map(|s| s.0).collect();
    ids.sort_unstable();
    assert_eq!(stopped, ids);

    // Audio after the interruption starts at the current clock, not after the
    // flushed segments.
    harness.speaker.set_clock(0.1);
    harness.remote.push(audio_event(0.2));
    harness.settle().await;
    let last = harness.speaker.started().last().copied().unwrap();
    assert!((last.1 - 0.1).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_finished_segments_are_reaped() {
    let mut harness = start(config());
    harness.ready().await;

    harness.remote.push(audio_event(0.2));
    harness.remote.push(audio_event(0.2));
    harness.settle().await;
    assert_eq!(harness.handle.snapshot().active_segments, 2);

    harness.speaker.set_clock(0.3);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.handle.snapshot().active_segments, 1);

    harness.speaker.set_clock(1.0);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(harness.handle.snapshot().active_segments, 0);
}

#[tokio::test(start_paused = true)]
async fn test_odd_length_payload_is_dropped() {
    let mut harness = start(config());
    harness.ready().await;

    harness.remote.push(LiveEvent::Audio(TransportBlob {
        mime_type: "audio/pcm;rate=24000".into(),
        data: base64::engine::general_purpose::STANDARD.encode([0u8, 1, 2]),
    }));
    harness.remote.push(LiveEvent::Audio(TransportBlob {
        mime_type: "audio/pcm;rate=24000".into(),
        data: "not base64!".into(),
    }));
    harness.settle().await;

    assert!(harness.speaker.started().is_empty());
    assert_eq!(harness.handle.state(), ConnectionState::Connected);

    harness.remote.push(audio_event(0.1));
    harness.settle().await;
    assert_eq!(harness.speaker.started().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_audio_rate_follows_mime_type() {
    let mut harness = start(config());
    harness.ready().await;

    // 16000 samples tagged at 16 kHz last one second.
    harness.remote.push(LiveEvent::Audio(TransportBlob {
        mime_type: "audio/pcm;rate=16000".into(),
        data: base64::engine::general_purpose::STANDARD.encode(vec![0u8; 32_000]),
    }));
    harness.settle().await;

    let started = harness.speaker.started();
    assert_eq!(started.len(), 1);
    assert!((started[0].2 - 1.0).abs() < 1e-9);
}
