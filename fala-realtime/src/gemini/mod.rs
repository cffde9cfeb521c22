//! Gemini Live API transport.
//!
//! Connects to Google's WebSocket `BidiGenerateContent` endpoint:
//!
//! - Input audio: 16kHz mono PCM
//! - Output audio: 24kHz mono PCM
//! - Input and output transcription enabled in the setup message
//!
//! # Example
//!
//! ```rust,ignore
//! use fala_realtime::gemini::GeminiConnector;
//! use fala_realtime::{LiveConnector, SessionSetup};
//!
//! let connector = GeminiConnector::new(std::env::var("GEMINI_API_KEY")?);
//! let session = connector
//!     .connect(SessionSetup::new(fala_realtime::gemini::DEFAULT_MODEL, "Be a kind tutor.", "Puck"))
//!     .await?;
//! session.close().await?;
//! ```

mod connector;
mod session;

pub use connector::GeminiConnector;
pub use session::GeminiLiveSession;

/// Gemini Live API WebSocket URL.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub use crate::config::DEFAULT_MODEL;

/// Prebuilt voices used by the coach personas.
pub const GEMINI_VOICES: &[&str] = &["Puck", "Charon", "Kore", "Fenrir", "Aoede"];

#[cfg(test)]
mod tests {
    use super::*;
    use fala_core::{StepKind, persona_for};

    #[test]
    fn test_every_persona_uses_a_prebuilt_voice() {
        for kind in StepKind::ALL {
            let persona = persona_for(kind);
            assert!(GEMINI_VOICES.contains(&persona.voice), "{} has no prebuilt voice", persona.name);
        }
    }
}
