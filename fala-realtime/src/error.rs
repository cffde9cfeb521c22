//! Error types for voice sessions.

use thiserror::Error;

/// Result type for voice session operations.
pub type Result<T> = std::result::Result<T, VoiceError>;

/// Errors that can occur while running a voice session.
#[derive(Error, Debug)]
pub enum VoiceError {
    /// Microphone unavailable or permission denied.
    #[error("Device error: {0}")]
    DeviceError(String),

    /// An audio context could not be resumed without a user gesture.
    #[error("Audio context error: {0}")]
    AudioContextError(String),

    /// Connection to the live endpoint failed or dropped.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The endpoint sent something we could not interpret.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Inbound audio payload was malformed.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// The model stayed silent through every wake stimulus.
    #[error("Model stalled: no response after {retries} wake attempts")]
    StallError {
        /// Wake stimuli sent without an answer.
        retries: u32,
    },

    /// Completion was requested before enough turns were exchanged.
    #[error("Lesson cannot be completed yet: {turns} of {required} turns")]
    CompletionLocked {
        /// Turns completed so far.
        turns: u32,
        /// Turns required by the completion gate.
        required: u32,
    },

    /// The session task is no longer running.
    #[error("Session already closed")]
    SessionClosed,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Timeout waiting for the endpoint.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Lesson could not be prepared.
    #[error("Lesson error: {0}")]
    Lesson(#[from] fala_core::CoreError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl VoiceError {
    /// Create a new device error.
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Self::DeviceError(msg.into())
    }

    /// Create a new audio context error.
    pub fn audio_context<S: Into<String>>(msg: S) -> Self {
        Self::AudioContextError(msg.into())
    }

    /// Create a new transport error.
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::TransportError(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::ProtocolError(msg.into())
    }

    /// Create a new decoding error.
    pub fn decoding<S: Into<String>>(msg: S) -> Self {
        Self::DecodingError(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }
}
