//! Lesson session orchestration.
//!
//! [`LessonSession`] wires a lesson to the live endpoint: it renders the coach
//! brief, opens the transport, pumps microphone frames out, schedules model
//! audio, assembles the transcript and runs the stall watchdog. Everything runs
//! in one spawned task that multiplexes its inputs with `tokio::select!`, so
//! handlers never race each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use fala_realtime::{LessonSession, SessionConfig};
//! use fala_realtime::gemini::GeminiConnector;
//!
//! let handle = LessonSession::builder(lesson)
//!     .connector(GeminiConnector::new(api_key))
//!     .microphone(mic)
//!     .output(speaker)
//!     .config(SessionConfig::default())
//!     .build()?
//!     .start()?;
//!
//! handle.wait_for(|s| s.may_complete).await?;
//! handle.complete().await?;
//! let outcome = handle.join().await;
//! ```

use crate::audio::{decode_base64, encode, wake_stimulus};
use crate::capture::{CapturePipeline, CaptureSettings, MicGate, Microphone, MicrophoneStream};
use crate::config::SessionConfig;
use crate::error::{Result, VoiceError};
use crate::events::LiveEvent;
use crate::handle::{
    Command, NoOpObserver, SessionHandle, SessionObserver, SessionOutcome, SessionSnapshot,
};
use crate::playback::{AudioOutput, PlaybackScheduler};
use crate::session::{BoxedSession, LiveConnector, LiveSession, SessionSetup};
use crate::state::{
    ConnectionState, FailureReason, SessionAction, SessionInput, SessionStateMachine,
};
use crate::transcript::TranscriptAssembler;
use crate::watchdog::Watchdog;
use fala_core::{LessonBrief, LessonContext};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, Sleep};
use tracing::Instrument;

/// Builder for [`LessonSession`].
pub struct LessonSessionBuilder {
    lesson: LessonContext,
    template: Option<String>,
    connector: Option<Arc<dyn LiveConnector>>,
    microphone: Option<Arc<dyn Microphone>>,
    output: Option<Box<dyn AudioOutput>>,
    config: SessionConfig,
    observer: Option<Arc<dyn SessionObserver>>,
    gate: MicGate,
}

impl LessonSessionBuilder {
    /// Create a new builder.
    pub fn new(lesson: LessonContext) -> Self {
        Self {
            lesson,
            template: None,
            connector: None,
            microphone: None,
            output: None,
            config: SessionConfig::default(),
            observer: None,
            gate: MicGate::default(),
        }
    }

    /// Set the live endpoint connector. It holds the credential.
    pub fn connector(mut self, connector: impl LiveConnector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Set an already shared connector.
    pub fn shared_connector(mut self, connector: Arc<dyn LiveConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn microphone(mut self, microphone: impl Microphone + 'static) -> Self {
        self.microphone = Some(Arc::new(microphone));
        self
    }

    pub fn output(mut self, output: impl AudioOutput + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Set the session configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Render the instruction from a custom template instead of the default.
    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set the observer receiving completion, disconnect and transcript hooks.
    pub fn observer(mut self, observer: impl SessionObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Start muted or use a gate shared with a device backend.
    pub fn mic_gate(mut self, gate: MicGate) -> Self {
        self.gate = gate;
        self
    }

    /// Build the session (does not connect yet).
    pub fn build(self) -> Result<LessonSession> {
        self.config.validate()?;
        let connector = self.connector.ok_or_else(|| VoiceError::config("Connector is required"))?;
        let microphone =
            self.microphone.ok_or_else(|| VoiceError::config("Microphone is required"))?;
        let output = self.output.ok_or_else(|| VoiceError::config("Audio output is required"))?;

        let brief = match &self.template {
            Some(template) => LessonBrief::with_template(&self.lesson, template)?,
            None => LessonBrief::for_lesson(&self.lesson)?,
        };

        Ok(LessonSession {
            lesson: self.lesson,
            brief,
            connector,
            microphone,
            output,
            config: self.config,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoOpObserver)),
            gate: self.gate,
        })
    }
}

/// A voice lesson ready to start.
pub struct LessonSession {
    lesson: LessonContext,
    brief: LessonBrief,
    connector: Arc<dyn LiveConnector>,
    microphone: Arc<dyn Microphone>,
    output: Box<dyn AudioOutput>,
    config: SessionConfig,
    observer: Arc<dyn SessionObserver>,
    gate: MicGate,
}

impl std::fmt::Debug for LessonSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LessonSession")
            .field("lesson", &self.lesson)
            .field("brief", &self.brief)
            .field("config", &self.config)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl LessonSession {
    /// Create a new builder.
    pub fn builder(lesson: LessonContext) -> LessonSessionBuilder {
        LessonSessionBuilder::new(lesson)
    }

    pub fn brief(&self) -> &LessonBrief {
        &self.brief
    }

    /// Spawn the session task on the current tokio runtime.
    pub fn start(self) -> Result<SessionHandle> {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            muted: !self.gate.is_open(),
            ..Default::default()
        });

        let span = fala_telemetry::voice_session_span(
            &self.lesson.key(),
            self.brief.persona.name,
            self.brief.voice(),
        );
        let brief = self.brief.clone();
        let gate = self.gate.clone();
        let task = SessionTask::new(self, command_rx, snapshot_tx);
        let task: JoinHandle<SessionOutcome> = tokio::spawn(task.run().instrument(span));

        Ok(SessionHandle { commands: command_tx, snapshot: snapshot_rx, gate, brief, task })
    }
}

async fn poll_slot<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn sleep_slot(slot: &mut Option<std::pin::Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn recv_slot<T>(slot: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match slot {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn mic_slot(slot: &mut Option<MicrophoneStream>) -> Option<Vec<f32>> {
    match slot {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

/// State owned by the session task.
struct SessionTask {
    setup: SessionSetup,
    connector: Arc<dyn LiveConnector>,
    microphone: Arc<dyn Microphone>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,

    machine: SessionStateMachine,
    transcript: TranscriptAssembler,
    scheduler: PlaybackScheduler<Box<dyn AudioOutput>>,
    pipeline: CapturePipeline,
    watchdog: Watchdog,

    commands: mpsc::Receiver<Command>,
    snapshot: watch::Sender<SessionSnapshot>,

    session: Option<Arc<dyn LiveSession>>,
    session_id: Option<String>,
    reader: Option<JoinHandle<()>>,
    events: Option<mpsc::Receiver<Result<LiveEvent>>>,
    mic: Option<MicrophoneStream>,

    connecting: Option<BoxFuture<'static, Result<BoxedSession>>>,
    acquiring: Option<BoxFuture<'static, Result<MicrophoneStream>>>,
    resuming: Option<BoxFuture<'static, Result<()>>>,
    resume_waiters: Vec<oneshot::Sender<Result<()>>>,
    settle: Option<std::pin::Pin<Box<Sleep>>>,
    reap_tick: Interval,

    wake_stimuli_sent: u32,
    failure: Option<VoiceError>,
    completed: bool,
    released: bool,
    reported_state: ConnectionState,
}

impl SessionTask {
    fn new(
        lesson: LessonSession,
        commands: mpsc::Receiver<Command>,
        snapshot: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let config = lesson.config;
        let setup = SessionSetup::from_brief(config.model.clone(), &lesson.brief);
        let mut reap_tick = tokio::time::interval(config.reap_interval);
        reap_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            setup,
            connector: lesson.connector,
            microphone: lesson.microphone,
            observer: lesson.observer,
            machine: SessionStateMachine::new(config.max_wake_retries),
            transcript: TranscriptAssembler::new(config.thought_markers.clone()),
            scheduler: PlaybackScheduler::new(lesson.output),
            pipeline: CapturePipeline::new(lesson.gate, config.input_sample_rate),
            watchdog: Watchdog::new(config.watchdog_timeout),
            config,
            commands,
            snapshot,
            session: None,
            session_id: None,
            reader: None,
            events: None,
            mic: None,
            connecting: None,
            acquiring: None,
            resuming: None,
            resume_waiters: Vec::new(),
            settle: None,
            reap_tick,
            wake_stimuli_sent: 0,
            failure: None,
            completed: false,
            released: false,
            reported_state: ConnectionState::Connecting,
        }
    }

    async fn run(mut self) -> SessionOutcome {
        tracing::info!(
            provider = self.connector.provider(),
            model = %self.setup.model,
            "Connecting voice session"
        );
        let connector = self.connector.clone();
        let setup = self.setup.clone();
        self.connecting = Some(Box::pin(async move { connector.connect(setup).await }));

        while !self.machine.state().is_terminal() {
            tokio::select! {
                result = poll_slot(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connected(result).await;
                }
                event = recv_slot(&mut self.events) => match event {
                    Some(event) => self.on_event(event).await,
                    None => {
                        self.events = None;
                        tracing::info!("Live endpoint closed the session");
                        self.apply(SessionInput::TransportClosed).await;
                    }
                },
                frame = mic_slot(&mut self.mic) => match frame {
                    Some(frame) => self.on_frame(frame).await,
                    None => {
                        self.failure = Some(VoiceError::device("microphone stopped delivering audio"));
                        self.apply(SessionInput::MicrophoneDenied("microphone stream ended".into())).await;
                    }
                },
                result = poll_slot(&mut self.acquiring) => {
                    self.acquiring = None;
                    self.on_acquired(result).await;
                }
                result = poll_slot(&mut self.resuming) => {
                    self.resuming = None;
                    self.on_resumed(result).await;
                }
                _ = sleep_slot(&mut self.settle) => {
                    self.settle = None;
                    self.apply(SessionInput::SettleElapsed).await;
                }
                _ = self.watchdog.expired() => {
                    tracing::debug!(retries = self.machine.wake_retries(), "Watchdog expired");
                    self.apply(SessionInput::WatchdogExpired).await;
                }
                _ = self.reap_tick.tick() => {
                    let now = self.scheduler.now();
                    self.scheduler.reap(now);
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        tracing::debug!("All session handles dropped");
                        self.apply(SessionInput::Teardown).await;
                    }
                },
            }
            self.publish().await;
        }

        self.release().await;
        self.publish().await;
        self.outcome()
    }

    /// Feed one input through the state machine and perform the resulting
    /// actions. Actions may produce follow-up inputs, which are handled in order.
    async fn apply(&mut self, input: SessionInput) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            for action in self.machine.handle(input) {
                if let Some(follow_up) = self.perform(action).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn perform(&mut self, action: SessionAction) -> Option<SessionInput> {
        match action {
            SessionAction::ResumeAudio => {
                if self.resuming.is_none() {
                    self.resuming = Some(self.scheduler.output().resume());
                }
            }
            SessionAction::AcquireMicrophone => {
                let microphone = self.microphone.clone();
                let settings = CaptureSettings {
                    format: crate::audio::AudioFormat::new(self.config.input_sample_rate, 1),
                    frame_samples: self.config.frame_samples,
                };
                self.acquiring = Some(Box::pin(async move { microphone.acquire(settings).await }));
            }
            SessionAction::StartSettleTimer => {
                self.settle = Some(Box::pin(tokio::time::sleep(self.config.settle_delay)));
            }
            SessionAction::SendWakeStimulus => {
                let noise = wake_stimulus(self.config.wake_samples, self.config.wake_amplitude);
                let blob = encode(&noise, self.config.input_sample_rate);
                self.wake_stimuli_sent += 1;
                tracing::debug!(count = self.wake_stimuli_sent, "Sending wake stimulus");
                return self.send(&blob).await;
            }
            SessionAction::ArmWatchdog => self.watchdog.arm(),
            SessionAction::CancelWatchdog => self.watchdog.cancel(),
            SessionAction::FlushPlayback => {
                let stopped = self.scheduler.flush();
                tracing::info!(stopped, "Model interrupted, playback flushed");
            }
            SessionAction::ReleaseResources => self.release().await,
        }
        None
    }

    async fn send(&mut self, blob: &crate::audio::TransportBlob) -> Option<SessionInput> {
        let session = self.session.as_ref()?;
        match session.send_media(blob).await {
            Ok(()) => None,
            // The remote side hung up before the reader saw the end of the stream.
            Err(e) if matches!(e, VoiceError::SessionClosed) || !session.is_connected() => {
                tracing::info!(error = %e, "Live endpoint closed the session during send");
                Some(SessionInput::TransportClosed)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send audio");
                let message = e.to_string();
                self.failure.get_or_insert(e);
                Some(SessionInput::TransportFailed(message))
            }
        }
    }

    async fn on_connected(&mut self, result: Result<BoxedSession>) {
        match result {
            Ok(session) => {
                let session: Arc<dyn LiveSession> = Arc::from(session);
                let id = session.session_id().to_string();
                fala_telemetry::record_session_id(&id);
                tracing::info!(session_id = %id, "Voice session connected");

                let (tx, rx) = mpsc::channel(64);
                let reader = session.clone();
                self.reader = Some(tokio::spawn(async move {
                    while let Some(event) = reader.next_event().await {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                }));
                self.events = Some(rx);
                self.session = Some(session);
                self.session_id = Some(id);
                self.apply(SessionInput::TransportOpened).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect voice session");
                let message = e.to_string();
                self.failure = Some(e);
                self.apply(SessionInput::TransportFailed(message)).await;
            }
        }
    }

    async fn on_acquired(&mut self, result: Result<MicrophoneStream>) {
        match result {
            Ok(stream) => {
                tracing::info!("Microphone acquired");
                self.mic = Some(stream);
                self.apply(SessionInput::MicrophoneAcquired).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Microphone unavailable");
                let message = e.to_string();
                self.failure = Some(e);
                self.apply(SessionInput::MicrophoneDenied(message)).await;
            }
        }
    }

    async fn on_resumed(&mut self, result: Result<()>) {
        match result {
            Ok(()) => {
                self.apply(SessionInput::ResumeSucceeded).await;
                for waiter in self.resume_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Audio output needs a user gesture to resume");
                self.apply(SessionInput::ResumeRejected).await;
                let message = e.to_string();
                for waiter in self.resume_waiters.drain(..) {
                    let _ = waiter.send(Err(VoiceError::audio_context(message.clone())));
                }
            }
        }
    }

    async fn on_frame(&mut self, frame: Vec<f32>) {
        if self.machine.state() != ConnectionState::Connected {
            return;
        }
        if let Some(blob) = self.pipeline.process(&frame) {
            if let Some(input) = self.send(&blob).await {
                self.apply(input).await;
            }
        }
    }

    async fn on_event(&mut self, event: Result<LiveEvent>) {
        let event = match event {
            Ok(event) => event,
            Err(e @ VoiceError::TransportError(_)) => {
                tracing::error!(error = %e, "Live transport failed");
                let message = e.to_string();
                self.failure = Some(e);
                self.apply(SessionInput::TransportFailed(message)).await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed server message");
                return;
            }
        };

        if event.is_model_activity() {
            self.apply(SessionInput::ModelActivity).await;
        }

        match event {
            LiveEvent::SetupComplete | LiveEvent::ModelText(_) => {}
            LiveEvent::Audio(blob) => self.play(&blob),
            LiveEvent::OutputTranscript(text) => {
                self.transcript.push_model(&text);
            }
            LiveEvent::InputTranscript(text) => {
                self.transcript.push_user(&text);
                self.apply(SessionInput::UserSpeech).await;
            }
            LiveEvent::Interrupted => self.apply(SessionInput::Interrupted).await,
            LiveEvent::TurnComplete => {
                let partial_ids: Vec<String> = self
                    .transcript
                    .messages()
                    .iter()
                    .filter(|m| m.partial)
                    .map(|m| m.id.clone())
                    .collect();
                let turns = self.transcript.turn_complete();
                let span = fala_telemetry::turn_span(turns);
                let messages = self.transcript.messages();
                let observer = &self.observer;
                async move {
                    tracing::info!(messages = messages.len(), "Turn complete");
                    for message in messages.iter().filter(|m| partial_ids.contains(&m.id)) {
                        observer.on_message(message).await;
                    }
                }
                .instrument(span)
                .await;
                self.apply(SessionInput::TurnComplete).await;
            }
            LiveEvent::GoAway { time_left } => {
                tracing::warn!(?time_left, "Live endpoint will close the session soon");
            }
            LiveEvent::Error { code, message } => {
                tracing::error!(?code, %message, "Live endpoint reported an error");
                let error = VoiceError::transport(format!("server error: {}", message));
                self.failure = Some(error);
                self.apply(SessionInput::TransportFailed(message)).await;
            }
        }
    }

    /// Decode and schedule one inbound segment. Bad payloads are dropped.
    fn play(&mut self, blob: &crate::audio::TransportBlob) {
        let rate = blob.sample_rate().unwrap_or(self.config.output_sample_rate);
        let buffer = match decode_base64(&blob.data, rate, self.config.output_channels) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable audio segment");
                return;
            }
        };
        let now = self.scheduler.now();
        if let Err(e) = self.scheduler.enqueue(&buffer, now) {
            tracing::warn!(error = %e, "Failed to schedule audio segment");
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Refresh => {}
            Command::ResumeAudio(reply) => {
                self.resume_waiters.push(reply);
                if self.resuming.is_none() {
                    self.resuming = Some(self.scheduler.output().resume());
                }
            }
            Command::Complete(reply) => {
                let turns = self.transcript.turns();
                if !turns.reached(self.config.completion_threshold) {
                    tracing::info!(turns = turns.get(), "Completion refused, not enough turns");
                    let _ = reply.send(Err(VoiceError::CompletionLocked {
                        turns: turns.get(),
                        required: self.config.completion_threshold,
                    }));
                    return;
                }
                tracing::info!(turns = turns.get(), "Lesson completed");
                self.completed = true;
                self.apply(SessionInput::Teardown).await;
                let _ = reply.send(Ok(()));
                self.observer.on_complete().await;
            }
            Command::Disconnect => {
                tracing::info!("Learner left the lesson");
                self.apply(SessionInput::Teardown).await;
                self.observer.on_disconnect().await;
            }
        }
    }

    /// Release every resource the session holds. Safe to call repeatedly.
    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        self.watchdog.cancel();
        self.settle = None;
        self.connecting = None;
        self.acquiring = None;
        self.resuming = None;
        for waiter in self.resume_waiters.drain(..) {
            let _ = waiter.send(Err(VoiceError::SessionClosed));
        }

        if let Some(mut mic) = self.mic.take() {
            mic.release();
        }
        self.scheduler.close();

        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events = None;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!(error = %e, "Error while closing live session");
            }
        }

        tracing::info!(
            frames_sent = self.pipeline.frames_sent(),
            frames_muted = self.pipeline.frames_muted(),
            wake_stimuli = self.wake_stimuli_sent,
            turns = self.transcript.turns().get(),
            "Voice session resources released"
        );
    }

    async fn publish(&mut self) {
        let state = self.machine.state();
        if state != self.reported_state {
            self.reported_state = state;
            tracing::info!(%state, "Connection state changed");
            self.observer.on_state_change(state).await;
        }

        let turns = self.transcript.turns();
        let next = SessionSnapshot {
            session_id: self.session_id.clone(),
            state,
            messages: self.transcript.messages().to_vec(),
            thinking: self.machine.is_thinking(),
            turns: turns.get(),
            muted: !self.pipeline.gate().is_open(),
            needs_interaction: self.machine.needs_interaction(),
            may_complete: turns.reached(self.config.completion_threshold),
            wake_stimuli_sent: self.wake_stimuli_sent,
            active_segments: self.scheduler.active_len(),
        };
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn outcome(&mut self) -> SessionOutcome {
        if self.completed {
            return SessionOutcome::Completed;
        }
        if self.machine.state() != ConnectionState::Error {
            return SessionOutcome::Disconnected;
        }
        let error = match (self.machine.failure(), self.failure.take()) {
            (Some(FailureReason::Stalled { retries }), _) => {
                VoiceError::StallError { retries: *retries }
            }
            (_, Some(error)) => error,
            (Some(FailureReason::Transport(message)), None) => VoiceError::transport(message.clone()),
            (Some(FailureReason::Microphone(message)), None) => VoiceError::device(message.clone()),
            (None, None) => VoiceError::SessionClosed,
        };
        tracing::error!(error = %error, "Voice session failed");
        SessionOutcome::Failed(error)
    }
}
