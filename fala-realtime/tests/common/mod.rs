//! In-memory transport, microphone and speaker for driving sessions in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use fala_core::{Cefr, LessonContext, Level, Step, StepKind, Subject, UserProfile};
use fala_realtime::{
    AudioBuffer, AudioOutput, BoxedSession, CaptureSettings, ChatMessage, ConnectionState,
    LiveConnector, LiveEvent, LiveSession, Microphone, MicrophoneStream, Result, SegmentId,
    SessionConfig, SessionObserver, SessionSetup, TransportBlob, VoiceError,
};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Samples per microphone frame in tests; wake stimuli use a different length.
pub const TEST_FRAME_SAMPLES: usize = 160;

pub fn lesson() -> LessonContext {
    LessonContext::new(
        UserProfile::new("Ana", "English"),
        Level::new("a1", "Beginner", Cefr::A1),
        Subject::new("cafe", "At the café"),
        Step::new("order", "Ordering coffee", StepKind::Speaking, "Order a coffee politely"),
    )
    .unwrap()
}

pub fn config() -> SessionConfig {
    SessionConfig::default()
        .with_frame_samples(TEST_FRAME_SAMPLES)
        .with_settle_delay(Duration::from_millis(500))
        .with_watchdog_timeout(Duration::from_secs(4))
}

/// Base64 PCM16 of `seconds` of silence at 24 kHz.
pub fn audio_event(seconds: f64) -> LiveEvent {
    let samples = (seconds * 24_000.0).round() as usize;
    LiveEvent::Audio(TransportBlob {
        mime_type: "audio/pcm;rate=24000".into(),
        data: base64::engine::general_purpose::STANDARD.encode(vec![0u8; samples * 2]),
    })
}

fn blob_samples(blob: &TransportBlob) -> usize {
    base64::engine::general_purpose::STANDARD.decode(&blob.data).map(|b| b.len() / 2).unwrap_or(0)
}

/// Test side of a fake live session.
#[derive(Clone)]
pub struct Remote {
    events: mpsc::UnboundedSender<Result<LiveEvent>>,
    sent: Arc<Mutex<Vec<TransportBlob>>>,
    closed: Arc<AtomicBool>,
    setups: Arc<Mutex<Vec<SessionSetup>>>,
}

impl Remote {
    pub fn push(&self, event: LiveEvent) {
        let _ = self.events.send(Ok(event));
    }

    pub fn push_error(&self, error: VoiceError) {
        let _ = self.events.send(Err(error));
    }

    pub fn sent(&self) -> Vec<TransportBlob> {
        self.sent.lock().unwrap().clone()
    }

    /// Microphone frames received, excluding wake stimuli.
    pub fn frames_received(&self) -> usize {
        self.sent().iter().filter(|b| blob_samples(b) == TEST_FRAME_SAMPLES).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Simulate the endpoint hanging up while its event stream is still open.
    pub fn mark_remote_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn setups(&self) -> Vec<SessionSetup> {
        self.setups.lock().unwrap().clone()
    }
}

struct FakeSession {
    events: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<LiveEvent>>>,
    sent: Arc<Mutex<Vec<TransportBlob>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl LiveSession for FakeSession {
    fn session_id(&self) -> &str {
        "fake-session"
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn send_media(&self, blob: &TransportBlob) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(VoiceError::SessionClosed);
        }
        self.sent.lock().unwrap().push(blob.clone());
        Ok(())
    }

    async fn next_event(&self) -> Option<Result<LiveEvent>> {
        self.events.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one fake session, or failing.
pub struct FakeConnector {
    session: Mutex<Option<FakeSession>>,
    setups: Arc<Mutex<Vec<SessionSetup>>>,
    fail: bool,
}

impl FakeConnector {
    pub fn new() -> (Self, Remote) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let setups = Arc::new(Mutex::new(Vec::new()));
        let session = FakeSession {
            events: tokio::sync::Mutex::new(rx),
            sent: sent.clone(),
            closed: closed.clone(),
        };
        let remote = Remote { events: tx, sent, closed, setups: setups.clone() };
        (Self { session: Mutex::new(Some(session)), setups, fail: false }, remote)
    }

    pub fn failing() -> Self {
        Self { session: Mutex::new(None), setups: Arc::default(), fail: true }
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    fn provider(&self) -> &str {
        "fake"
    }

    async fn connect(&self, setup: SessionSetup) -> Result<BoxedSession> {
        if self.fail {
            return Err(VoiceError::transport("connection refused"));
        }
        self.setups.lock().unwrap().push(setup);
        let session = self.session.lock().unwrap().take().ok_or(VoiceError::SessionClosed)?;
        Ok(Box::new(session))
    }
}

/// Test side of a fake microphone.
#[derive(Clone, Default)]
pub struct MicControl {
    frames: Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>,
    released: Arc<AtomicUsize>,
}

impl MicControl {
    pub async fn send_frame(&self) {
        let tx = self.frames.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(vec![0.1; TEST_FRAME_SAMPLES]).await;
        }
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn is_acquired(&self) -> bool {
        self.frames.lock().unwrap().is_some()
    }
}

pub struct FakeMicrophone {
    control: MicControl,
    deny: bool,
}

impl FakeMicrophone {
    pub fn new() -> (Self, MicControl) {
        let control = MicControl::default();
        (Self { control: control.clone(), deny: false }, control)
    }

    pub fn denied() -> (Self, MicControl) {
        let control = MicControl::default();
        (Self { control: control.clone(), deny: true }, control)
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn acquire(&self, settings: CaptureSettings) -> Result<MicrophoneStream> {
        if self.deny {
            return Err(VoiceError::device("permission denied"));
        }
        assert_eq!(settings.frame_samples, TEST_FRAME_SAMPLES);
        let (tx, rx) = mpsc::channel(16);
        *self.control.frames.lock().unwrap() = Some(tx);
        let released = self.control.released.clone();
        Ok(MicrophoneStream::new(rx, move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

/// Test side of a fake speaker.
#[derive(Clone, Default)]
pub struct SpeakerControl {
    pub clock: Arc<Mutex<f64>>,
    pub started: Arc<Mutex<Vec<(SegmentId, f64, f64)>>>,
    pub stopped: Arc<Mutex<Vec<SegmentId>>>,
    pub closed: Arc<AtomicBool>,
    /// Results returned by successive `resume` calls; empty means success.
    pub resume_results: Arc<Mutex<VecDeque<bool>>>,
}

impl SpeakerControl {
    pub fn set_clock(&self, seconds: f64) {
        *self.clock.lock().unwrap() = seconds;
    }

    pub fn started(&self) -> Vec<(SegmentId, f64, f64)> {
        self.started.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<SegmentId> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct FakeSpeaker {
    control: SpeakerControl,
}

impl FakeSpeaker {
    pub fn new() -> (Self, SpeakerControl) {
        let control = SpeakerControl::default();
        (Self { control: control.clone() }, control)
    }
}

impl AudioOutput for FakeSpeaker {
    fn current_time(&self) -> f64 {
        *self.control.clock.lock().unwrap()
    }

    fn resume(&self) -> BoxFuture<'static, Result<()>> {
        let ok = self.control.resume_results.lock().unwrap().pop_front().unwrap_or(true);
        Box::pin(async move {
            if ok { Ok(()) } else { Err(VoiceError::audio_context("user gesture required")) }
        })
    }

    fn start_segment(&mut self, id: SegmentId, buffer: &AudioBuffer, when: f64) -> Result<()> {
        self.control.started.lock().unwrap().push((id, when, buffer.duration()));
        Ok(())
    }

    fn stop_segment(&mut self, id: SegmentId) {
        self.control.stopped.lock().unwrap().push(id);
    }

    fn close(&mut self) {
        self.control.closed.store(true, Ordering::SeqCst);
    }
}

/// Observer counting callbacks.
#[derive(Clone, Default)]
pub struct Recorder {
    pub completed: Arc<AtomicUsize>,
    pub disconnected: Arc<AtomicUsize>,
    pub states: Arc<Mutex<Vec<ConnectionState>>>,
    pub messages: Arc<Mutex<Vec<ChatMessage>>>,
}

#[async_trait]
impl SessionObserver for Recorder {
    async fn on_state_change(&self, state: ConnectionState) {
        self.states.lock().unwrap().push(state);
    }

    async fn on_message(&self, message: &ChatMessage) {
        self.messages.lock().unwrap().push(message.clone());
    }

    async fn on_complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_disconnect(&self) {
        self.disconnected.fetch_add(1, Ordering::SeqCst);
    }
}

/// Everything a test needs to drive one session.
pub struct Harness {
    pub handle: fala_realtime::SessionHandle,
    pub remote: Remote,
    pub mic: MicControl,
    pub speaker: SpeakerControl,
    pub recorder: Recorder,
}

/// Route session logs to the test output. Set `RUST_LOG` to see them.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn start(config: SessionConfig) -> Harness {
    init_logging();
    let (connector, remote) = FakeConnector::new();
    let (microphone, mic) = FakeMicrophone::new();
    let (speaker_device, speaker) = FakeSpeaker::new();
    let recorder = Recorder::default();
    let handle = fala_realtime::LessonSession::builder(lesson())
        .connector(connector)
        .microphone(microphone)
        .output(speaker_device)
        .config(config)
        .observer(recorder.clone())
        .build()
        .unwrap()
        .start()
        .unwrap();
    Harness { handle, remote, mic, speaker, recorder }
}

impl Harness {
    /// Wait until connected with the first wake stimulus sent.
    pub async fn ready(&mut self) {
        self.handle.wait_for(|s| s.wake_stimuli_sent >= 1).await.unwrap();
        assert_eq!(self.handle.state(), ConnectionState::Connected);
    }

    /// Let the session task drain pending work without moving the clock much.
    pub async fn settle(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
