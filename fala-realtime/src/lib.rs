//! # fala-realtime
//!
//! Streaming voice session manager for fala lessons.
//!
//! A lesson is a duplex audio conversation with a live model endpoint. This
//! crate opens the connection, streams microphone audio out, plays the coach's
//! audio back without gaps, assembles live transcripts and keeps a silent model
//! talking with a watchdog.
//!
//! ## Architecture
//!
//! ```text
//!   Microphone ──► CapturePipeline ──► LiveSession ──► LiveEvent stream
//!                    (MicGate)             ▲                 │
//!                                          │                 ▼
//!                 SessionStateMachine ◄── LessonSession ──► TranscriptAssembler
//!                   (Watchdog)                 │
//!                                              ▼
//!                                     PlaybackScheduler ──► AudioOutput
//! ```
//!
//! - [`audio`]: PCM16 transport codec and frame chunking
//! - [`playback`]: gapless scheduling on an output clock, flush on barge-in
//! - [`capture`]: microphone seam and mute-gated encoding
//! - [`transcript`]: per-role fragment merging with thought stripping
//! - [`state`]: pure connection state machine with bounded wake retries
//! - [`orchestrator`]: the session task tying it all together
//!
//! ## Example
//!
//! ```rust,ignore
//! use fala_realtime::{LessonSession, SessionConfig};
//! use fala_realtime::gemini::GeminiConnector;
//!
//! let handle = LessonSession::builder(lesson)
//!     .connector(GeminiConnector::new(api_key))
//!     .microphone(mic)
//!     .output(speaker)
//!     .build()?
//!     .start()?;
//!
//! let mut updates = handle.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{} turns, thinking: {}", snapshot.turns, snapshot.thinking);
//! }
//! ```

pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod handle;
pub mod orchestrator;
pub mod playback;
pub mod session;
pub mod state;
pub mod transcript;
pub mod watchdog;

#[cfg(feature = "gemini")]
pub mod gemini;

pub use audio::{AudioBuffer, AudioFormat, FrameChunker, TransportBlob, decode, decode_base64, encode};
pub use capture::{
    CapturePipeline, CaptureSettings, DeviceGuard, MicGate, Microphone, MicrophoneStream,
};
pub use config::SessionConfig;
pub use error::{Result, VoiceError};
pub use events::{ClientMessage, LiveEvent, parse_server_message};
pub use handle::{NoOpObserver, SessionHandle, SessionObserver, SessionOutcome, SessionSnapshot};
pub use orchestrator::{LessonSession, LessonSessionBuilder};
pub use playback::{AudioOutput, PlaybackScheduler, ScheduledSegment, SegmentId};
pub use session::{BoxedSession, LiveConnector, LiveSession, SessionSetup};
pub use state::{ConnectionState, SessionAction, SessionInput, SessionStateMachine};
pub use transcript::{ChatMessage, Role, ThoughtMarkers, TranscriptAssembler, TurnCounter};
pub use watchdog::Watchdog;
