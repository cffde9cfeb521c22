//! Live API wire messages.
//!
//! Inbound JSON is parsed into an ordered list of [`LiveEvent`]s. One server
//! message can carry several signals at once (audio, transcripts and a
//! turn-complete flag); they are emitted in the order the session must apply
//! them, with `TurnComplete` always last.

use crate::audio::TransportBlob;
use crate::error::{Result, VoiceError};
use crate::session::SessionSetup;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Typed event from the live endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// The endpoint accepted the setup message.
    SetupComplete,
    /// A chunk of model audio, still base64-encoded.
    Audio(TransportBlob),
    /// Text part of a model turn. Counts as activity only.
    ModelText(String),
    /// Transcription fragment of the learner's speech.
    InputTranscript(String),
    /// Transcription fragment of the model's speech.
    OutputTranscript(String),
    /// The model was cut off (barge-in).
    Interrupted,
    TurnComplete,
    /// The server is about to close the connection.
    GoAway { time_left: Option<String> },
    Error { code: Option<i64>, message: String },
}

impl LiveEvent {
    /// Whether this event shows the model is responding.
    pub fn is_model_activity(&self) -> bool {
        matches!(self, Self::Audio(_) | Self::ModelText(_) | Self::OutputTranscript(_))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
    interrupted: Option<bool>,
    turn_complete: Option<bool>,
    go_away: Option<GoAway>,
    error: Option<ServerError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    interrupted: Option<bool>,
    turn_complete: Option<bool>,
    input_transcription: Option<Transcription>,
    output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelTurn {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Part {
    inline_data: Option<InlineData>,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InlineData {
    mime_type: Option<String>,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Transcription {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GoAway {
    time_left: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerError {
    code: Option<i64>,
    message: Option<String>,
}

fn transcript_text(transcription: Option<Transcription>) -> Option<String> {
    transcription.and_then(|t| t.text).filter(|text| !text.is_empty())
}

/// Parse one server message into events.
///
/// Unknown fields are ignored; a message that is not JSON is a protocol error.
/// Audio parts default to `audio/pcm;rate=24000` when no MIME type is given.
pub fn parse_server_message(raw: &str) -> Result<Vec<LiveEvent>> {
    let message: ServerMessage = serde_json::from_str(raw)
        .map_err(|e| VoiceError::protocol(format!("Parse error: {}", e)))?;

    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(LiveEvent::SetupComplete);
    }

    let content = message.server_content.unwrap_or_default();
    let interrupted = content.interrupted.or(message.interrupted).unwrap_or(false);
    let turn_complete = content.turn_complete.or(message.turn_complete).unwrap_or(false);

    if interrupted {
        events.push(LiveEvent::Interrupted);
    }

    for part in content.model_turn.map(|turn| turn.parts).unwrap_or_default() {
        if let Some(inline) = part.inline_data {
            if !inline.data.is_empty() {
                events.push(LiveEvent::Audio(TransportBlob {
                    mime_type: inline
                        .mime_type
                        .unwrap_or_else(|| crate::audio::AudioFormat::output().mime_type()),
                    data: inline.data,
                }));
            }
        }
        if let Some(text) = part.text.filter(|t| !t.is_empty()) {
            events.push(LiveEvent::ModelText(text));
        }
    }

    for text in [content.input_transcription, message.input_transcription]
        .into_iter()
        .filter_map(transcript_text)
    {
        events.push(LiveEvent::InputTranscript(text));
    }
    for text in [content.output_transcription, message.output_transcription]
        .into_iter()
        .filter_map(transcript_text)
    {
        events.push(LiveEvent::OutputTranscript(text));
    }

    if turn_complete {
        events.push(LiveEvent::TurnComplete);
    }

    if let Some(go_away) = message.go_away {
        events.push(LiveEvent::GoAway { time_left: go_away.time_left });
    }
    if let Some(error) = message.error {
        events.push(LiveEvent::Error {
            code: error.code,
            message: error.message.unwrap_or_else(|| "unknown server error".to_string()),
        });
    }

    Ok(events)
}

/// Message sent to the live endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    setup: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    realtime_input: Option<RealtimeInput>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<TransportBlob>,
}

impl ClientMessage {
    /// Opening message: model, persona voice, system instruction and
    /// transcription of both directions.
    pub fn setup(setup: &SessionSetup) -> Self {
        let mut body = json!({
            "model": setup.model,
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": setup.voice }
                    }
                }
            },
            "inputAudioTranscription": {},
            "outputAudioTranscription": {},
        });
        if !setup.instruction.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": setup.instruction }] });
        }
        Self { setup: Some(body), realtime_input: None }
    }

    /// One captured audio frame.
    pub fn media(blob: &TransportBlob) -> Self {
        Self { setup: None, realtime_input: Some(RealtimeInput { media_chunks: vec![blob.clone()] }) }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
