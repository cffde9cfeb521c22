//! Transport traits for the live endpoint.

use crate::audio::TransportBlob;
use crate::error::Result;
use crate::events::LiveEvent;
use async_trait::async_trait;
use fala_core::LessonBrief;
use serde::{Deserialize, Serialize};

/// Parameters sent when opening a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSetup {
    /// Model identifier, e.g. `models/gemini-2.5-flash-native-audio-preview-09-2025`.
    pub model: String,
    /// System instruction for the coach.
    pub instruction: String,
    /// Prebuilt voice name.
    pub voice: String,
}

impl SessionSetup {
    pub fn new(
        model: impl Into<String>,
        instruction: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self {
        Self { model: model.into(), instruction: instruction.into(), voice: voice.into() }
    }

    /// Setup for a lesson brief.
    pub fn from_brief(model: impl Into<String>, brief: &LessonBrief) -> Self {
        Self::new(model, brief.instruction.clone(), brief.voice())
    }
}

/// An open duplex session with the live endpoint.
///
/// Events arrive already parsed. `next_event` returns `None` once the remote
/// side closed the connection.
#[async_trait]
pub trait LiveSession: Send + Sync {
    /// Get the session ID.
    fn session_id(&self) -> &str;

    /// Check if the session is currently connected.
    fn is_connected(&self) -> bool;

    /// Send one encoded audio frame.
    async fn send_media(&self, blob: &TransportBlob) -> Result<()>;

    /// Get the next event from the server.
    async fn next_event(&self) -> Option<Result<LiveEvent>>;

    /// Close the session gracefully.
    async fn close(&self) -> Result<()>;
}

/// A boxed session type for dynamic dispatch.
pub type BoxedSession = Box<dyn LiveSession>;

/// Opens live sessions. Holds the credential.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Provider name used in logs.
    fn provider(&self) -> &str;

    /// Open a session and wait until the endpoint accepted `setup`.
    async fn connect(&self, setup: SessionSetup) -> Result<BoxedSession>;
}
