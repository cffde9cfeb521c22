//! Wake stimulus timing under a paused clock.
//!
//! Settle delay is 500 ms and the watchdog timeout 4 s, so the first wake
//! stimulus goes out at t0 = 500 ms after connecting.

mod common;

use common::*;
use fala_realtime::{LiveEvent, SessionOutcome, VoiceError};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

fn wakes(harness: &Harness) -> u32 {
    harness.handle.snapshot().wake_stimuli_sent
}

#[tokio::test(start_paused = true)]
async fn test_first_wake_after_settle_delay() {
    let started = Instant::now();
    let mut harness = start(config());
    harness.ready().await;

    assert_eq!(started.elapsed(), Duration::from_millis(500));
    assert_eq!(wakes(&harness), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silence_sends_wake_every_timeout() {
    let mut harness = start(config());
    harness.ready().await;
    let t0 = Instant::now();

    sleep_until(t0 + Duration::from_millis(3999)).await;
    assert_eq!(wakes(&harness), 1);
    sleep_until(t0 + Duration::from_millis(4001)).await;
    assert_eq!(wakes(&harness), 2);
    sleep_until(t0 + Duration::from_millis(7999)).await;
    assert_eq!(wakes(&harness), 2);
    sleep_until(t0 + Duration::from_millis(8001)).await;
    assert_eq!(wakes(&harness), 3);
}

#[tokio::test(start_paused = true)]
async fn test_turn_complete_rearms_watchdog() {
    let mut harness = start(config());
    harness.ready().await;
    let t0 = Instant::now();

    sleep_until(t0 + Duration::from_millis(3900)).await;
    harness.remote.push(LiveEvent::TurnComplete);

    sleep_until(t0 + Duration::from_millis(4100)).await;
    assert_eq!(wakes(&harness), 1);
    sleep_until(t0 + Duration::from_millis(7800)).await;
    assert_eq!(wakes(&harness), 1);
    sleep_until(t0 + Duration::from_millis(7950)).await;
    assert_eq!(wakes(&harness), 2);
}

#[tokio::test(start_paused = true)]
async fn test_model_audio_cancels_watchdog() {
    let mut harness = start(config());
    harness.ready().await;
    let t0 = Instant::now();

    sleep_until(t0 + Duration::from_secs(1)).await;
    harness.remote.push(audio_event(0.2));
    harness.settle().await;
    assert!(!harness.handle.snapshot().thinking);

    sleep_until(t0 + Duration::from_secs(12)).await;
    assert_eq!(wakes(&harness), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_model_fails_after_bounded_retries() {
    let mut harness = start(config().with_max_wake_retries(2));
    harness.ready().await;

    let remote = harness.remote.clone();
    let outcome = harness.handle.join().await;

    assert!(matches!(outcome, SessionOutcome::Failed(VoiceError::StallError { retries: 2 })));
    assert!(remote.is_closed());
    // Initial stimulus plus two retries.
    assert_eq!(remote.sent().len(), 3);
}
